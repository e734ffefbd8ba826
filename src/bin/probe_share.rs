use clap::Parser;
use dexcom_share_bridge::{
    region::Region,
    share::{GlucoseSource, ShareClient, MAX_MINUTES},
};
use simple_logger::SimpleLogger;

/// Probe Share credentials.
///
/// This is a test cli to verify a set of credentials directly against
/// both Share regions. It logs which region accepts them, along with
/// the latest reading when one is available. The JSON envelope contract
/// of the dexcom_bridge cli does not apply here.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "probe_share")]
struct ProbeShare {
    /// Share account username.
    #[arg(long = "username")]
    username: String,
    /// Share account password.
    #[arg(long = "password")]
    password: String,
}

fn main() {
    SimpleLogger::new().init().unwrap();
    log::set_max_level(log::LevelFilter::Info);

    let args = ProbeShare::parse();

    let mut working_region: Option<Region> = None;

    for region in [Region::Us, Region::OutsideUs] {
        log::info!("Testing {} region...", region.get_name());
        match ShareClient::connect(&args.username, &args.password, region) {
            Ok(client) => {
                log::info!(
                    "Connected to {} as account {}.",
                    region.get_name(),
                    client.get_account_id()
                );
                match client.get_glucose_readings(MAX_MINUTES, 1) {
                    Ok(readings) => match readings.first() {
                        Some(reading) => log::info!(
                            "Latest reading: {} mg/dL ({}) at {}",
                            reading.value,
                            reading.trend_description,
                            reading.timestamp
                        ),
                        None => log::info!("Connected, but no recent reading found."),
                    },
                    Err(error) => log::error!("Failed to fetch readings: {error}"),
                }
                if working_region.is_none() {
                    working_region = Some(region);
                }
            }
            Err(error) => log::error!("Failed to connect to {}: {error}", region.get_name()),
        }
    }

    match working_region {
        Some(region) => log::info!(
            "Summary: credentials work with the {} region.",
            region.get_name()
        ),
        None => log::error!("Summary: credentials failed on both regions."),
    }
}
