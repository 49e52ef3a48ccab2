#![forbid(unsafe_code)]
//! Generates a node keypair file and prints its address.

use clap::Parser;
use std::path::PathBuf;

use emberchain::crypto::{address_to_hex, KeyPair};

#[derive(Parser)]
#[command(name = "ember-keygen", about = "Generate or inspect an Emberchain keypair")]
struct Args {
    /// Where to write the hex-encoded secret key.
    #[arg(short, long, default_value = "ember.key")]
    out: PathBuf,

    /// Print the address of an existing key file instead of generating one.
    #[arg(long)]
    show: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.show {
        let keypair = KeyPair::load_from_file(&args.out)?;
        println!("{}", address_to_hex(&keypair.address()));
        return Ok(());
    }

    if args.out.exists() {
        return Err(format!("{} already exists; refusing to overwrite", args.out.display()).into());
    }

    let keypair = KeyPair::generate()?;
    keypair.save_to_file(&args.out)?;
    println!("Wrote {}", args.out.display());
    println!("Address: {}", address_to_hex(&keypair.address()));
    Ok(())
}
