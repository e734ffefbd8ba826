use clap::CommandFactory;
use clap_complete::{generate, Shell};
use dexcom_share_bridge::dexcom_bridge::DexcomBridge;
use std::io;

fn main() {
    let mut command = DexcomBridge::command();
    let bin_name = command.get_name().to_string();

    generate(Shell::Bash, &mut command, bin_name, &mut io::stdout())
}
