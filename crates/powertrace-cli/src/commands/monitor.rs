//! `powertrace monitor`: sample GPU/CPU power into a JSON-lines log.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use powertrace_core::{HostProbe, SamplerConfig, run_sampler};

use super::parse_duration;

/// Run the monitor command.
pub fn run(gpu: u32, interval: &str, log_path: &str) {
    let interval = match parse_duration(interval) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let config = SamplerConfig {
        gpu_index: gpu,
        interval,
        log_path: PathBuf::from(log_path),
    };

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    println!("Monitoring power");
    println!("  GPU:       {}", config.gpu_index);
    println!("  Interval:  {}ms", config.interval.as_millis());
    println!("  Output:    {}", config.log_path.display());
    println!("  Press Ctrl+C to stop");
    println!();

    let mut probe = HostProbe::new(config.gpu_index);
    match run_sampler(&config, &mut probe, &running) {
        Ok(n) => {
            println!("Stopped after {n} sample(s); log at {}", config.log_path.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
