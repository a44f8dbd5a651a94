//! `powertrace analyze`: summarize a telemetry log.

use std::path::PathBuf;

use powertrace_core::{AnalysisConfig, XAxis, run_analysis};

pub struct AnalyzeCommandConfig<'a> {
    pub src: &'a str,
    pub gpu_index: Option<u32>,
    pub out_dir: Option<&'a str>,
    pub zip: bool,
    pub zip_name: Option<&'a str>,
    pub x_axis: &'a str,
}

fn build_config(cmd: &AnalyzeCommandConfig<'_>) -> AnalysisConfig {
    AnalysisConfig {
        gpu_index: cmd.gpu_index,
        out_dir: cmd.out_dir.map(PathBuf::from),
        archive: cmd.zip,
        archive_name: cmd.zip_name.map(str::to_string),
        // clap restricts the value to the known axis names.
        x_axis: XAxis::parse(cmd.x_axis).unwrap_or_default(),
        ..AnalysisConfig::new(cmd.src)
    }
}

/// Warning for archive names that do not end in `.tar.gz`.
fn zip_name_warning(name: &str) -> Option<String> {
    (!name.to_ascii_lowercase().ends_with(".tar.gz"))
        .then(|| format!("Warning: archive '{name}' will be a gzip-compressed tar, not a zip file"))
}

/// Run the analyze command.
pub fn run(cmd: AnalyzeCommandConfig<'_>) {
    let config = build_config(&cmd);
    if cmd.zip {
        if let Some(warning) = cmd.zip_name.and_then(zip_name_warning) {
            eprintln!("{warning}");
        }
    }

    let manifest = match run_analysis(&config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&manifest) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    println!("[DONE]");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_flags_onto_analysis_config() {
        let config = build_config(&AnalyzeCommandConfig {
            src: "logs/power_log.jsonl",
            gpu_index: Some(1),
            out_dir: Some("out"),
            zip: true,
            zip_name: None,
            x_axis: "time",
        });
        assert_eq!(config.src, PathBuf::from("logs/power_log.jsonl"));
        assert_eq!(config.gpu_index, Some(1));
        assert_eq!(config.out_dir, Some(PathBuf::from("out")));
        assert!(config.archive);
        assert!(config.archive_name.is_none());
        assert_eq!(config.x_axis, XAxis::Time);
    }

    #[test]
    fn warns_on_archive_names_that_are_not_tar_gz() {
        assert!(zip_name_warning("run.zip").is_some());
        assert!(zip_name_warning("run.ZIP").is_some());
        assert!(zip_name_warning("run").is_some());
        assert!(zip_name_warning("run.tar.gz").is_none());
    }
}
