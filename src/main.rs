use clap::{Arg, Command};
use log::LevelFilter;
use sms_relay::cipher;
use sms_relay::contacts::ContactBook;
use sms_relay::delivery::{DeliveryPipeline, WorkerSet};
use sms_relay::device::DeviceLabelResolver;
use sms_relay::event_log::{format_timestamp, EventLog};
use sms_relay::filter::classify;
use sms_relay::notify::LogNotifier;
use sms_relay::relay::ReqwestTransport;
use sms_relay::store::{
    mask_topic, EnvSecret, FileFilterStore, FilterConfigStore, MemoryFilterStore, SecretStore,
};
use sms_relay::{Config, InboundMessage, ReceiverStores, SmsReceiver};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG_PATH: &str = "/etc/sms-relay.yaml";
const TOPIC_ENV: &str = "SMS_RELAY_TOPIC";
const PASSWORD_ENV: &str = "SMS_RELAY_PASSWORD";

#[tokio::main]
async fn main() {
    let matches = Command::new("sms-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forward important text messages to a push relay, encrypted")
        .long_about(
            "Reads inbound text messages, decides which ones matter using configurable\n\
             sender/keyword/OTP rules, and relays them AES-encrypted to a push topic.\n\
             In the default mode messages are read from stdin as `sender<TAB>body` lines.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and print a summary")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("classify")
                .long("classify")
                .value_names(["SENDER", "BODY"])
                .num_args(2)
                .help("Classify a single message and print the decision")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("decrypt")
                .long("decrypt")
                .value_name("ENVELOPE")
                .help("Decrypt a relayed envelope with the configured password")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("show-logs")
                .long("show-logs")
                .help("Print the event log, newest first")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clear-logs")
                .long("clear-logs")
                .help("Clear the event log and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    let topic = EnvSecret::new(TOPIC_ENV, config.relay.topic.clone());
    let password = EnvSecret::new(PASSWORD_ENV, config.relay.password.clone());

    if matches.get_flag("test-config") {
        print_config_summary(&config, &topic, &password);
        return;
    }

    if let Some(mut values) = matches.get_many::<String>("classify") {
        let sender = values.next().map(String::as_str);
        let body = values.next().map(String::as_str);
        match classify(sender, body, &config.filters) {
            Ok(classification) => println!("{classification}"),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(envelope) = matches.get_one::<String>("decrypt") {
        let Some(password) = password.get().filter(|p| !p.is_empty()) else {
            eprintln!("❌ No encryption password configured (set relay.password or {PASSWORD_ENV})");
            process::exit(1);
        };
        match cipher::decrypt(envelope, &password) {
            Ok(plaintext) => println!("{plaintext}"),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(1);
            }
        }
        return;
    }

    let event_log = Arc::new(match config.event_log.path.as_deref() {
        Some(path) => EventLog::open(path),
        None => EventLog::in_memory(),
    });

    if matches.get_flag("clear-logs") {
        event_log.clear();
        println!("✅ Event log cleared");
        return;
    }

    if matches.get_flag("show-logs") {
        let entries = event_log.entries();
        if entries.is_empty() {
            println!("📭 No log entries");
        }
        for entry in entries {
            println!(
                "{} [{:?}] {}",
                format_timestamp(&entry.timestamp),
                entry.level,
                entry.message
            );
            if let Some(details) = entry.details {
                println!("    {details}");
            }
        }
        return;
    }

    if let Err(e) = run(config, config_path, topic, password, event_log).await {
        log::error!("sms-relay error: {e}");
        process::exit(1);
    }
}

async fn run(
    config: Config,
    config_path: &str,
    topic: EnvSecret,
    password: EnvSecret,
    event_log: Arc<EventLog>,
) -> anyhow::Result<()> {
    let transport = ReqwestTransport::new(
        &config.relay.user_agent,
        Duration::from_secs(config.relay.timeout_seconds),
    )?;
    let pipeline = DeliveryPipeline::new(
        transport,
        event_log.clone(),
        Arc::new(LogNotifier),
        DeviceLabelResolver::system(config.device_label.as_deref()),
    );

    let filters: Arc<dyn FilterConfigStore> = if Path::new(config_path).exists() {
        Arc::new(FileFilterStore::new(config_path, config.filters.clone()))
    } else {
        Arc::new(MemoryFilterStore::new(config.filters.clone())?)
    };

    let receiver = SmsReceiver::new(
        ReceiverStores {
            filters,
            contacts: Arc::new(ContactBook::new(&config.contacts)),
            topic: Arc::new(topic),
            password: Arc::new(password),
        },
        &config.relay.endpoint,
        event_log,
        Arc::new(pipeline),
    );

    log::info!("Starting sms-relay, reading messages from stdin...");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut workers = WorkerSet::new();
    let mut received = 0usize;
    let mut forwarded = 0usize;
    while let Some(line) = lines.next_line().await? {
        workers.reap();
        if line.trim().is_empty() {
            continue;
        }
        received += 1;
        if receiver.on_message_into(InboundMessage::from_line(&line), &mut workers) {
            forwarded += 1;
        }
    }

    // Workers run to completion even after input ends
    workers.drain().await;

    log::info!(
        "Processed {received} messages: {forwarded} forwarded, {} delivered",
        workers.delivered()
    );
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Set relay.topic and relay.password before forwarding messages.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_config_summary(config: &Config, topic: &EnvSecret, password: &EnvSecret) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Relay endpoint: {}", config.relay.endpoint);
    match topic.get().filter(|t| !t.is_empty()) {
        Some(topic) => println!("Topic: {}", mask_topic(&topic)),
        None => println!("⚠️  Topic: not configured"),
    }
    if password.get().filter(|p| !p.is_empty()).is_some() {
        println!("Password: configured");
    } else {
        println!("⚠️  Password: not configured");
    }
    println!("Timeout: {}s", config.relay.timeout_seconds);
    println!();
    println!("Forward all: {}", config.filters.forward_all);
    println!("Important senders: {}", config.filters.important_senders.len());
    println!("Important keywords: {}", config.filters.important_keywords.len());
    println!("Spam keywords: {}", config.filters.spam_keywords.len());
    println!("OTP pattern: {} (compiles)", config.filters.otp_pattern);
    println!("Contacts: {}", ContactBook::new(&config.contacts).len());
    println!();
    println!("✅ Configuration is valid");
}
