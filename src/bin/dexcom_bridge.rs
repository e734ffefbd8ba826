use clap::Parser;
use dexcom_share_bridge::{
    dexcom_bridge::{run, DexcomBridge, Envelope},
    share::ShareClient,
};
use simple_logger::SimpleLogger;
use std::process;

fn main() {
    SimpleLogger::new().init().unwrap();

    let args = DexcomBridge::parse();

    // Probe the transport before touching any credential. This is the
    // one failure that exits non-zero; every other failure is reported
    // through the envelope with exit status 0.
    if let Err(error) = ShareClient::available() {
        emit(&Envelope::failure(format!(
            "dexcom share client not found: {error}"
        )));
        process::exit(1);
    }

    let envelope = run::<DexcomBridge, ShareClient>(&args);

    emit(&envelope);
}

/// Write the envelope to stdout, the only line ever printed there.
fn emit(envelope: &Envelope) {
    match serde_json::to_string(envelope) {
        Ok(body) => println!("{body}"),
        Err(error) => println!(
            "{}",
            serde_json::json!({
                "success": false,
                "error": format!("Failed to encode envelope: {error}"),
            })
        ),
    }
}
