use crate::{error::BridgeError, region::Region};
use chrono::{FixedOffset, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use reqwest::blocking::Client;
use std::error::Error as StdError;
use thiserror::Error as ThisError;

const APPLICATION_ID: &str = "d89443d2-327c-4a6f-89e5-496bbb0317db";
const USER_AGENT: &str = "Dexcom Share/3.0.4.11 CFNetwork/1121.2.2 Darwin/19.6.0";
const ZEROED_UUID: &str = "00000000-0000-0000-0000-000000000000";
const WT_TIMESTAMP_REGEXP: &str = r"Date\((?P<ms>\d+)(?P<offset>[+-]\d{4})?\)";

/// Widest window the Share service accepts, in minutes.
pub const MAX_MINUTES: u32 = 1440;
/// Most samples the Share service returns, one reading every five
/// minutes over the maximum window.
pub const MAX_COUNT: u32 = 288;

/// Source of glucose readings.
///
/// The bridge only talks to the service through this trait, so that the
/// action handlers can be exercised against a stub source.
pub trait GlucoseSource: Sized {
    /// Authenticate with the given credentials and region.
    fn connect(username: &str, password: &str, region: Region) -> Result<Self, BridgeError>;
    fn get_username(&self) -> &str;
    fn get_account_id(&self) -> &str;
    /// Readings reported within the last `minutes`, at most `max_count`
    /// of them, in the order the service returned them.
    fn get_glucose_readings(
        &self,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<GlucoseReading>, BridgeError>;
}

/// Trend direction reported by the Share service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trend {
    None,
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    NotComputable,
    RateOutOfRange,
}

impl Trend {
    pub fn from_share(direction: &str) -> Result<Trend, BridgeError> {
        match direction {
            "None" => Ok(Trend::None),
            "DoubleUp" => Ok(Trend::DoubleUp),
            "SingleUp" => Ok(Trend::SingleUp),
            "FortyFiveUp" => Ok(Trend::FortyFiveUp),
            "Flat" => Ok(Trend::Flat),
            "FortyFiveDown" => Ok(Trend::FortyFiveDown),
            "SingleDown" => Ok(Trend::SingleDown),
            "DoubleDown" => Ok(Trend::DoubleDown),
            "NotComputable" => Ok(Trend::NotComputable),
            "RateOutOfRange" => Ok(Trend::RateOutOfRange),
            _ => Err(BridgeError::SHARE(format!(
                "Unrecognized trend direction: {direction}"
            ))),
        }
    }

    pub fn get_description(&self) -> &str {
        match self {
            Trend::None => "",
            Trend::DoubleUp => "rising quickly",
            Trend::SingleUp => "rising",
            Trend::FortyFiveUp => "rising slightly",
            Trend::Flat => "steady",
            Trend::FortyFiveDown => "falling slightly",
            Trend::SingleDown => "falling",
            Trend::DoubleDown => "falling quickly",
            Trend::NotComputable => "unable to determine trend",
            Trend::RateOutOfRange => "trend unavailable",
        }
    }
}

/// One glucose measurement sample.
#[derive(Clone, Debug)]
pub struct GlucoseReading {
    /// Measured value in device units (mg/dL).
    pub value: i64,
    /// Human readable trend description.
    pub trend_description: String,
    /// Measurement time as an ISO-8601 string, carrying the utc offset
    /// when the service reported one.
    pub timestamp: String,
    /// The reading as the service reported it, verbatim.
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct GlucoseValueRecord {
    #[serde(rename = "WT")]
    wt: String,
    #[serde(rename = "Value")]
    value: i64,
    #[serde(rename = "Trend")]
    trend: String,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ShareErrorBody {
    #[serde(alias = "Code")]
    code: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

#[derive(Clone, Debug, Eq, ThisError, PartialEq)]
#[error("{0}")]
struct ErrorCallingShareService(String);

impl GlucoseReading {
    fn from_share_value(raw: &serde_json::Value) -> Result<GlucoseReading, BridgeError> {
        let record: GlucoseValueRecord = serde_json::from_value(raw.clone()).map_err(|error| {
            BridgeError::SHARE(format!("Error: {error:?} parsing reading: {raw:?}"))
        })?;

        Ok(GlucoseReading {
            value: record.value,
            trend_description: Trend::from_share(&record.trend)?
                .get_description()
                .to_owned(),
            timestamp: parse_share_timestamp(&record.wt)?,
            raw: raw.clone(),
        })
    }
}

/// Client for the Share web service.
///
/// Connecting authenticates immediately, resolving the account id and a
/// session id. Sessions are not reused across invocations, every
/// connect is a fresh authentication.
pub struct ShareClient {
    client: Client,
    base_url: String,
    username: String,
    account_id: String,
    session_id: String,
}

impl ShareClient {
    /// Check that the blocking http transport can be constructed.
    ///
    /// The main cli probes this before touching any credential, so that
    /// a broken transport stack (e.g. tls backend initialization) is
    /// reported through a dedicated envelope and a non-zero exit.
    pub fn available() -> Result<(), BridgeError> {
        match ShareClient::build_http_client() {
            Ok(_) => Ok(()),
            Err(error) => Err(BridgeError::ERROR(error.to_string())),
        }
    }

    fn build_http_client() -> Result<Client, reqwest::Error> {
        Client::builder().user_agent(USER_AGENT).build()
    }

    fn authenticate_account(
        client: &Client,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<String, BridgeError> {
        let body = serde_json::json!({
            "accountName": username,
            "password": password,
            "applicationId": APPLICATION_ID,
        });
        let text = service_post(
            client,
            &format!("{base_url}/General/AuthenticatePublisherAccount"),
            &body,
            &[],
        )
        .map_err(|error| BridgeError::SHARE(error.to_string()))?;

        parse_uuid_response(&text)
    }

    fn create_session(
        client: &Client,
        base_url: &str,
        account_id: &str,
        password: &str,
    ) -> Result<String, BridgeError> {
        let body = serde_json::json!({
            "accountId": account_id,
            "password": password,
            "applicationId": APPLICATION_ID,
        });
        let text = service_post(
            client,
            &format!("{base_url}/General/LoginPublisherAccountById"),
            &body,
            &[],
        )
        .map_err(|error| BridgeError::SHARE(error.to_string()))?;

        parse_uuid_response(&text)
    }
}

impl GlucoseSource for ShareClient {
    fn connect(username: &str, password: &str, region: Region) -> Result<ShareClient, BridgeError> {
        if username.is_empty() {
            return Err(BridgeError::SHARE("Username must not be empty".to_owned()));
        }
        if password.is_empty() {
            return Err(BridgeError::SHARE("Password must not be empty".to_owned()));
        }

        let client =
            ShareClient::build_http_client().map_err(|error| BridgeError::ERROR(error.to_string()))?;
        let base_url = region.get_base_url().to_owned();

        log::debug!("Authenticating against the {} share service...", region.get_name());

        let account_id = ShareClient::authenticate_account(&client, &base_url, username, password)?;
        let session_id = ShareClient::create_session(&client, &base_url, &account_id, password)?;

        Ok(ShareClient {
            client,
            base_url,
            username: username.to_owned(),
            account_id,
            session_id,
        })
    }

    fn get_username(&self) -> &str {
        &self.username
    }

    fn get_account_id(&self) -> &str {
        &self.account_id
    }

    fn get_glucose_readings(
        &self,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<GlucoseReading>, BridgeError> {
        // The service documents requests outside these bounds as
        // invalid, so they are rejected before going on the wire.
        if minutes == 0 || minutes > MAX_MINUTES {
            return Err(BridgeError::ERROR(format!(
                "Minutes must be between 1 and {MAX_MINUTES}, got {minutes}"
            )));
        }
        if max_count == 0 || max_count > MAX_COUNT {
            return Err(BridgeError::ERROR(format!(
                "Max count must be between 1 and {MAX_COUNT}, got {max_count}"
            )));
        }

        log::debug!("Fetching up to {max_count} readings from the last {minutes} minutes...");

        let query = [
            ("sessionId", self.session_id.clone()),
            ("minutes", minutes.to_string()),
            ("maxCount", max_count.to_string()),
        ];
        let text = service_post(
            &self.client,
            &format!("{}/Publisher/ReadPublisherLatestGlucoseValues", self.base_url),
            &serde_json::json!({}),
            &query,
        )
        .map_err(|error| BridgeError::SHARE(error.to_string()))?;

        let values: Vec<serde_json::Value> = serde_json::from_str(&text).map_err(|error| {
            BridgeError::SHARE(format!("Error: {error:?} parsing response: {text:?}"))
        })?;

        values.iter().map(GlucoseReading::from_share_value).collect()
    }
}

fn service_post(
    client: &Client,
    url: &str,
    body: &serde_json::Value,
    query: &[(&str, String)],
) -> Result<String, Box<dyn StdError>> {
    let response = client
        .post(url)
        .header("Accept", "application/json")
        .query(query)
        .json(body)
        .send()?;

    if response.status().is_success() {
        Ok(response.text()?)
    } else {
        let status = response.status();
        let text = response.text()?;
        let share_error: Result<ShareErrorBody, serde_json::Error> = serde_json::from_str(&text);
        match share_error {
            Ok(share_error) if share_error.code.is_some() || share_error.message.is_some() => {
                Err(Box::new(ErrorCallingShareService(format!(
                    "{}: {}",
                    share_error.code.unwrap_or_else(|| "Unknown".to_owned()),
                    share_error.message.unwrap_or_default()
                ))))
            }
            _ => Err(Box::new(ErrorCallingShareService(format!(
                "Error: {status:?} calling share service: {text:?}"
            )))),
        }
    }
}

/// Parse the quoted uuid the authentication endpoints return.
///
/// The service reports failed authentication for some account states as
/// a successful response carrying an all-zeros uuid, which must not be
/// carried into the readings request.
fn parse_uuid_response(text: &str) -> Result<String, BridgeError> {
    let uuid: String = serde_json::from_str(text).map_err(|error| {
        BridgeError::SHARE(format!("Error: {error:?} parsing response: {text:?}"))
    })?;

    if uuid.is_empty() || uuid == ZEROED_UUID {
        Err(BridgeError::SHARE("Failed to authenticate".to_owned()))
    } else {
        Ok(uuid)
    }
}

fn parse_share_timestamp(wt: &str) -> Result<String, BridgeError> {
    // This should never fail because we know WT_TIMESTAMP_REGEXP is
    // valid.
    let regex = Regex::new(WT_TIMESTAMP_REGEXP).unwrap();

    let captures = regex
        .captures(wt)
        .ok_or_else(|| BridgeError::SHARE(format!("Unrecognized timestamp format: {wt}")))?;

    let milliseconds: i64 = captures["ms"]
        .parse()
        .map_err(|_| BridgeError::SHARE(format!("Timestamp out of range: {wt}")))?;

    let datetime = match Utc.timestamp_millis_opt(milliseconds) {
        chrono::LocalResult::Single(datetime) => datetime,
        _ => return Err(BridgeError::SHARE(format!("Timestamp out of range: {wt}"))),
    };

    match captures.name("offset") {
        Some(offset) => {
            let offset = parse_utc_offset(offset.as_str())?;
            Ok(datetime
                .with_timezone(&offset)
                .to_rfc3339_opts(SecondsFormat::Secs, false))
        }
        None => Ok(datetime.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

fn parse_utc_offset(offset: &str) -> Result<FixedOffset, BridgeError> {
    let (sign, digits) = offset.split_at(1);
    // Note it is safe to unwrap here because the capture pattern
    // guarantees four digits.
    let hours: i32 = digits[..2].parse().unwrap();
    let minutes: i32 = digits[2..].parse().unwrap();
    let seconds = (hours * 3600 + minutes * 60) * if sign == "-" { -1 } else { 1 };

    FixedOffset::east_opt(seconds)
        .ok_or_else(|| BridgeError::SHARE(format!("Utc offset out of range: {offset}")))
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::{
        parse_share_timestamp, parse_uuid_response, GlucoseReading, GlucoseSource, ShareClient,
        Trend, MAX_COUNT, MAX_MINUTES, WT_TIMESTAMP_REGEXP,
    };
    use crate::error::BridgeError;

    fn offline_client() -> ShareClient {
        ShareClient {
            client: ShareClient::build_http_client().unwrap(),
            base_url: "http://127.0.0.1:9".to_owned(),
            username: "u".to_owned(),
            account_id: "a".to_owned(),
            session_id: "s".to_owned(),
        }
    }

    #[test]
    fn test_wt_timestamp_regexp() {
        let regexp = Regex::new(WT_TIMESTAMP_REGEXP).unwrap();

        let timestamp = regexp.captures("Date(1704067200000)").unwrap();
        assert_eq!(&timestamp["ms"], "1704067200000");
        assert!(timestamp.name("offset").is_none());

        let timestamp = regexp.captures("Date(1704067200000-0500)").unwrap();
        assert_eq!(&timestamp["ms"], "1704067200000");
        assert_eq!(timestamp.name("offset").unwrap().as_str(), "-0500");
    }

    #[test]
    fn test_parse_share_timestamp() {
        assert_eq!(
            parse_share_timestamp("Date(1704067200000)").unwrap(),
            "2024-01-01T00:00:00"
        );
        assert_eq!(
            parse_share_timestamp("Date(1704067200000-0500)").unwrap(),
            "2023-12-31T19:00:00-05:00"
        );
        assert_eq!(
            parse_share_timestamp("Date(1704067200000+0100)").unwrap(),
            "2024-01-01T01:00:00+01:00"
        );
        assert!(parse_share_timestamp("2024-01-01T00:00:00").is_err());
    }

    #[test]
    fn test_trend_directions() {
        assert_eq!(Trend::from_share("Flat").unwrap(), Trend::Flat);
        assert_eq!(
            Trend::from_share("FortyFiveDown").unwrap(),
            Trend::FortyFiveDown
        );
        assert!(Trend::from_share("Sideways").is_err());
    }

    #[test]
    fn test_trend_descriptions() {
        assert_eq!(Trend::None.get_description(), "");
        assert_eq!(Trend::DoubleUp.get_description(), "rising quickly");
        assert_eq!(Trend::Flat.get_description(), "steady");
        assert_eq!(Trend::FortyFiveDown.get_description(), "falling slightly");
        assert_eq!(Trend::RateOutOfRange.get_description(), "trend unavailable");
    }

    #[test]
    fn test_reading_from_share_value() {
        let raw = serde_json::json!({
            "WT": "Date(1704067200000)",
            "ST": "Date(1704067200000)",
            "DT": "Date(1704067200000-0500)",
            "Value": 120,
            "Trend": "Flat",
        });

        let reading = GlucoseReading::from_share_value(&raw).unwrap();

        assert_eq!(reading.value, 120);
        assert_eq!(reading.trend_description, "steady");
        assert_eq!(reading.timestamp, "2024-01-01T00:00:00");
        // The raw reading is carried verbatim, extra fields included.
        assert_eq!(reading.raw, raw);
    }

    #[test]
    fn test_reading_from_share_value_rejects_unknown_trend() {
        let raw = serde_json::json!({
            "WT": "Date(1704067200000)",
            "Value": 120,
            "Trend": "Sideways",
        });

        assert!(GlucoseReading::from_share_value(&raw).is_err());
    }

    #[test]
    fn test_parse_uuid_response() {
        assert_eq!(
            parse_uuid_response("\"a21d4d60-cc42-4e49-b9e8-32dbb135a0ff\"").unwrap(),
            "a21d4d60-cc42-4e49-b9e8-32dbb135a0ff"
        );
    }

    #[test]
    fn test_parse_uuid_response_rejects_zeroed_uuid() {
        assert_eq!(
            parse_uuid_response("\"00000000-0000-0000-0000-000000000000\"").unwrap_err(),
            BridgeError::SHARE("Failed to authenticate".to_owned())
        );
    }

    #[test]
    fn test_parse_uuid_response_rejects_unexpected_body() {
        assert!(parse_uuid_response("not json").is_err());
        assert!(parse_uuid_response("").is_err());
    }

    #[test]
    fn test_readings_window_bounds() {
        let client = offline_client();

        // Out of range windows are rejected before going on the wire,
        // so no network access happens here.
        assert!(client.get_glucose_readings(0, MAX_COUNT).is_err());
        assert!(client.get_glucose_readings(MAX_MINUTES + 1, MAX_COUNT).is_err());
        assert!(client.get_glucose_readings(MAX_MINUTES, 0).is_err());
        assert!(client.get_glucose_readings(MAX_MINUTES, MAX_COUNT + 1).is_err());
    }

    #[test]
    fn test_connect_rejects_empty_credentials() {
        use crate::region::Region;

        assert!(ShareClient::connect("", "secret", Region::Us).is_err());
        assert!(ShareClient::connect("user", "", Region::Us).is_err());
    }
}
