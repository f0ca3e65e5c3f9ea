//! ECS 集成
//!
//! 运行时持有脚本引擎，不能跨线程移动，因此作为 non-send 资源挂在 World 上，
//! 由 [`live_update_system`] 在拥有它的线程上每帧 tick 一次。

use bevy_ecs::prelude::*;

use super::{BridgeRuntime, TickReport};

/// 累计的实时更新统计
#[derive(Resource, Debug, Clone, Default)]
pub struct LiveUpdateStats {
    pub ticks: u64,
    pub applied: u64,
    pub rejected: u64,
    pub superseded: u64,
    pub last: TickReport,
}

/// 每次调度排空一次实时更新队列
pub fn live_update_system(mut runtime: NonSendMut<BridgeRuntime>, mut stats: ResMut<LiveUpdateStats>) {
    let report = runtime.tick();
    stats.ticks += 1;
    stats.applied += report.applied as u64;
    stats.rejected += report.rejected as u64;
    stats.superseded += report.superseded as u64;
    stats.last = report;
}

/// 把运行时放入 World，并把系统加入调度
pub fn install_live_updates(world: &mut World, schedule: &mut Schedule, runtime: BridgeRuntime) {
    world.insert_non_send_resource(runtime);
    world.init_resource::<LiveUpdateStats>();
    schedule.add_systems(live_update_system);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Shape, Signature};
    use crate::config::BridgeConfig;
    use crate::reflection::{HostClassDescriptor, ScriptClassDescriptor, UpdatePayload};
    use crate::scripting::RustScriptEngine;

    #[test]
    fn test_schedule_drains_queue() {
        let mut runtime = BridgeRuntime::new(BridgeConfig::default(), Box::new(RustScriptEngine::new()));
        runtime.register_host(HostClassDescriptor::new("Actor")).unwrap();
        let sender = runtime.open_queue();

        let mut world = World::new();
        let mut schedule = Schedule::default();
        install_live_updates(&mut world, &mut schedule, runtime);

        schedule.run(&mut world);
        assert_eq!(world.resource::<LiveUpdateStats>().ticks, 1);

        let mut reply = sender.submit_update(UpdatePayload::new().with_class(
            ScriptClassDescriptor::new("Boss")
                .extends("Actor")
                .method("taunt", Signature::new().returning(Shape::String)),
        ));
        schedule.run(&mut world);

        let stats = world.resource::<LiveUpdateStats>();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.last.applied, 1);
        assert!(reply.try_recv().unwrap().is_ok());
        assert!(world
            .non_send_resource::<BridgeRuntime>()
            .registry()
            .is_script_class("Boss"));
    }
}
