//! 离线绑定生成器
//!
//! ```text
//! script_bridge <metadata.json> [output] [--json | --binary] [--raw-names]
//! ```
//!
//! 读取宿主元数据的 JSON 转储，写出进程启动时加载的绑定表。
//! 未给出输出路径时使用配置中的 `binding.table_path`。

use script_bridge::binding::{BindingGenerator, GeneratorOptions, JsonMetadataFile};
use script_bridge::config::{ArtifactFormat, BridgeConfig};
use script_bridge::core::{init_logging, BridgeResult};

const USAGE: &str = "usage: script_bridge <metadata.json> [output] [--json | --binary] [--raw-names]";

struct Args {
    metadata: String,
    output: Option<String>,
    format: Option<ArtifactFormat>,
    raw_names: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut format = None;
    let mut raw_names = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => format = Some(ArtifactFormat::Json),
            "--binary" => format = Some(ArtifactFormat::Binary),
            "--raw-names" => raw_names = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let metadata = positional.next().ok_or_else(|| USAGE.to_string())?;
    let output = positional.next();
    if positional.next().is_some() {
        return Err(USAGE.to_string());
    }

    Ok(Args {
        metadata,
        output,
        format,
        raw_names,
    })
}

fn run(args: Args, config: &BridgeConfig) -> BridgeResult<()> {
    let generator = BindingGenerator::new(GeneratorOptions {
        script_naming: config.binding.script_naming && !args.raw_names,
    });
    let report = generator.generate(&JsonMetadataFile::new(&args.metadata))?;

    let output = args
        .output
        .or_else(|| config.binding.table_path.clone())
        .unwrap_or_else(|| "bindings.sbtb".to_string());
    let format = args.format.unwrap_or(config.binding.artifact_format);
    report.table.save(&output, format)?;

    tracing::info!(
        target: "binding",
        classes = report.table.len(),
        warnings = report.warnings.len(),
        checksum = %report.table.checksum()?,
        output = %output,
        "Binding table written"
    );
    println!(
        "{} classes, {} excluded members -> {}",
        report.table.len(),
        report.warnings.len(),
        output
    );
    Ok(())
}

fn main() {
    let config = BridgeConfig::load_or_default();
    init_logging(&config.logging);

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args, &config) {
        eprintln!("Binding generation failed: {}", e);
        std::process::exit(1);
    }
}
