use crate::{
    diversion::StdoutDiversion,
    region::Region,
    share::{GlucoseReading, GlucoseSource, MAX_COUNT, MAX_MINUTES},
};
use clap::Parser;
use log;

/// Relay Dexcom Share data as JSON.
///
/// Emits exactly one JSON envelope on stdout and always exits with
/// status 0, even when the envelope reports a failure. Callers must
/// inspect the envelope's `success` field, not the exit code.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "dexcom_bridge")]
pub struct DexcomBridge {
    /// Which action to execute?
    #[arg(value_enum, long = "action")]
    action: Action,
    /// Share account username.
    #[arg(long = "username")]
    username: String,
    /// Share account password.
    #[arg(long = "password")]
    password: String,
    /// Share service region. Exactly "OUS" selects the outside-US
    /// deployment, anything else selects US.
    #[arg(long = "region", default_value = "US")]
    region: String,
    /// Log level.
    #[arg(value_enum, long = "log-level", default_value = "warn")]
    log_level: LogLevel,
}

pub trait DexcomBridgeCli {
    fn get_action(&self) -> &Action;
    fn get_log_level(&self) -> &LogLevel;
    fn get_username(&self) -> &str;
    fn get_password(&self) -> &str;
    fn get_region(&self) -> &str;
}

impl DexcomBridgeCli for DexcomBridge {
    fn get_action(&self) -> &Action {
        &self.action
    }
    fn get_log_level(&self) -> &LogLevel {
        &self.log_level
    }
    fn get_username(&self) -> &str {
        &self.username
    }
    fn get_password(&self) -> &str {
        &self.password
    }
    fn get_region(&self) -> &str {
        &self.region
    }
}

/// Run the requested action and return the result envelope.
///
/// This never fails outward: any error raised while talking to the
/// glucose service is converted into the failure form of the envelope.
/// While the external calls run, stdout is diverted to stderr so that
/// transport noise cannot corrupt the JSON channel; the diversion is
/// released before this function returns.
pub fn run<T, C>(config: &T) -> Envelope
where
    T: DexcomBridgeCli,
    C: GlucoseSource,
{
    match config.get_log_level() {
        LogLevel::Trace => log::set_max_level(log::LevelFilter::Trace),
        LogLevel::Debug => log::set_max_level(log::LevelFilter::Debug),
        LogLevel::Info => log::set_max_level(log::LevelFilter::Info),
        LogLevel::Warn => log::set_max_level(log::LevelFilter::Warn),
        LogLevel::Error => log::set_max_level(log::LevelFilter::Error),
    };

    log::info!("Running dexcom bridge...");

    let region = Region::from_arg(config.get_region());

    let diversion = StdoutDiversion::acquire();
    if let Err(error) = &diversion {
        log::warn!("Running without stdout diversion: {error}");
    }

    let envelope = match config.get_action() {
        Action::Login => login::<C>(config.get_username(), config.get_password(), region),
        Action::Readings => get_readings::<C>(config.get_username(), config.get_password(), region),
    };

    drop(diversion);

    envelope
}

fn login<C>(username: &str, password: &str, region: Region) -> Envelope
where
    C: GlucoseSource,
{
    match C::connect(username, password, region) {
        Ok(source) => Envelope::authenticated(source.get_username(), source.get_account_id()),
        Err(error) => Envelope::failure(error.to_string()),
    }
}

fn get_readings<C>(username: &str, password: &str, region: Region) -> Envelope
where
    C: GlucoseSource,
{
    // An empty reading list is a valid response, not a failure.
    match C::connect(username, password, region)
        .and_then(|source| source.get_glucose_readings(MAX_MINUTES, MAX_COUNT))
    {
        Ok(readings) => Envelope::readings(readings),
        Err(error) => Envelope::failure(error.to_string()),
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Action {
    /// Authenticate and report the account identifier.
    Login,
    /// Authenticate and fetch up to 24 hours of glucose readings.
    Readings,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// The single JSON object emitted per invocation.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Login {
        success: bool,
        message: String,
        username: String,
        #[serde(rename = "accountId")]
        account_id: String,
    },
    Readings {
        success: bool,
        data: Vec<ReadingRecord>,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl Envelope {
    pub fn authenticated(username: &str, account_id: &str) -> Envelope {
        Envelope::Login {
            success: true,
            message: "Authenticated".to_owned(),
            username: username.to_owned(),
            account_id: account_id.to_owned(),
        }
    }

    pub fn readings(readings: Vec<GlucoseReading>) -> Envelope {
        Envelope::Readings {
            success: true,
            data: readings.into_iter().map(ReadingRecord::from).collect(),
        }
    }

    pub fn failure(error: String) -> Envelope {
        Envelope::Failure {
            success: false,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadingRecord {
    value: i64,
    trend: String,
    time: String,
    json: serde_json::Value,
}

impl From<GlucoseReading> for ReadingRecord {
    fn from(reading: GlucoseReading) -> ReadingRecord {
        ReadingRecord {
            value: reading.value,
            trend: reading.trend_description,
            time: reading.timestamp,
            json: reading.raw,
        }
    }
}
