mod error;
mod messages;
mod dehumidifier;
mod device;
mod simulator;
mod humidity;
mod coordinator;
mod config;
mod entity;
mod device_worker;
mod service;
mod mqtt_publisher;
mod mqtt_subscriber;
mod polling;

use std::path::Path;

use error_stack::Result;
use log::error;
use rustop::opts;
use tokio::time::Duration;

use config::{ConfigEntry, UserInput};
use error::ConfigError;
use service::ServiceConfig;
use simulator::SimulatedDehumidifier;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_version() -> String {
    format!("{} (built {})", built_info::PKG_VERSION, built_info::BUILT_TIME_UTC)
}

fn user_input(host: Option<String>, token: Option<String>, model: Option<String>, mac: Option<String>, name: &str) -> UserInput {
    UserInput {
        host: host.unwrap_or_default(),
        token: token.unwrap_or_default(),
        model,
        mac,
        name: Some(name.to_string()),
    }
}

/// Use the stored entry when there is one, otherwise create it from the command line (and store it).
fn get_config_entry(entry_file: Option<&Path>, input: UserInput) -> Result<ConfigEntry, ConfigError> {
    match entry_file {
        Some(path) if path.exists() => ConfigEntry::load(path),
        Some(path) => {
            let entry = ConfigEntry::from_user_input(input)?;
            entry.save(path)?;
            Ok(entry)
        }
        None => ConfigEntry::from_user_input(input),
    }
}

#[tokio::main]
async fn main() {
    let (args, _) = opts! {
        synopsis "MQTT Xiaomi dehumidifier controller";
        version env!("CARGO_PKG_VERSION");
        param controller_name:String, desc: "Controller name";
        param mqtt:String, desc: "MQTT broker to connect (host[:port])";
        opt entry:Option<String>, desc: "Config entry file (created from the other options if missing)";
        opt host:Option<String>, desc: "Dehumidifier address";
        opt token:Option<String>, desc: "Dehumidifier token (32 hex digits)";
        opt model:Option<String>, desc: "Dehumidifier model";
        opt mac:Option<String>, desc: "Dehumidifier MAC address";
        opt polling:Option<u64>, desc: "Polling period in seconds (default 60)";
        opt timeout:Option<u64>, desc: "Polling timeout in seconds (default 10)";
    }.parse_or_exit();

    env_logger::init();

    let input = user_input(args.host, args.token, args.model, args.mac, &args.controller_name);
    let entry = match get_config_entry(args.entry.as_deref().map(Path::new), input) {
        Ok(entry) => entry,
        Err(e) => {
            error!("Invalid dehumidifier configuration: {:?}", e);
            std::process::exit(1);
        }
    };

    let config = ServiceConfig {
        controller_name: args.controller_name,
        mqtt_broker_address: args.mqtt,
        entry,
        polling_period: args.polling.map(Duration::from_secs).unwrap_or(coordinator::UPDATE_INTERVAL),
        polling_timeout: args.timeout.map(Duration::from_secs).unwrap_or(coordinator::POLLING_TIMEOUT),
    };

    let service = service::Service::new(config, SimulatedDehumidifier::new());

    let service = service.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for ctrl-c: {:?}", e);
    }
    let _ = service.stop().await;
}

#[cfg(test)]
mod tests {
    use super::{get_config_entry, user_input};
    use crate::config::ConfigEntry;

    const TOKEN: &str = "38448B7D0C8E8B3FFF3014DF344BD11F";

    #[test]
    fn test_config_entry_created_then_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");

        let input = user_input(Some("10.0.0.2".to_string()), Some(TOKEN.to_string()), None, None, "Basement");
        let created = get_config_entry(Some(&path), input).unwrap();
        assert!(path.exists());
        assert_eq!(created.title, "Basement");

        // Stored entry wins over whatever is passed later
        let loaded = get_config_entry(Some(&path), user_input(None, None, None, None, "Other")).unwrap();
        assert_eq!(loaded, created);
        assert_eq!(ConfigEntry::load(&path).unwrap().data.token, TOKEN.to_lowercase());
    }

    #[test]
    fn test_config_entry_without_file_requires_host() {
        assert!(get_config_entry(None, user_input(None, Some(TOKEN.to_string()), None, None, "Basement")).is_err());
    }
}
