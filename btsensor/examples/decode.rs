use btsensor::{classify, Classification, Reading};
use std::env;

/// Decodes each hex payload given on the command line, e.g.
/// `cargo run --example decode 10161A18A4C1388C419300D2375A0BB82C`.
fn main() -> Result<(), eyre::Report> {
    for payload in env::args().skip(1) {
        println!("{payload}: {:?}", classify(&payload));
        if classify(&payload) == Classification::Unrecognised {
            continue;
        }
        match Reading::decode(&payload) {
            Ok(reading) => {
                println!("  {reading}");
                for (attribute, value) in reading.attributes() {
                    println!("  {attribute} = {value}");
                }
            }
            Err(e) => println!("  (Failed to decode: {e})"),
        }
    }

    Ok(())
}
