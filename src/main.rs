use chrono::Local;
use flexi_logger::Logger;
use log::info;
use nsgp::{param, run, version};
use std::env;
use std::error::Error;
use std::fs::File;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let param_path = args.get(1).cloned().unwrap_or_else(|| "param.yaml".to_string());
    let param = param::get(param_path)?;

    let _logger = Logger::try_with_str(&param.general.log_level)?.start()?;
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    info!("nsgp {} starting run {}", version(), timestamp);

    let report = run(&param)?;

    let report_path = format!("nsgp_run_{}.json", timestamp);
    serde_json::to_writer_pretty(File::create(&report_path)?, &report)?;
    info!("Report saved to {}", report_path);

    Ok(())
}
