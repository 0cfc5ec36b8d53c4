use bilirank_bilibili::{decode_bvid, encode_avid};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum BvidCommands {
    /// Numeric aid to BV short id
    Encode { aid: u64 },
    /// BV short id to numeric aid
    Decode { bvid: String },
}

pub(crate) fn run_bvid(command: &BvidCommands) -> anyhow::Result<()> {
    match command {
        BvidCommands::Encode { aid } => println!("{}", encode_avid(*aid)),
        BvidCommands::Decode { bvid } => {
            let aid = decode_bvid(bvid.trim());
            if aid == 0 {
                anyhow::bail!("'{bvid}' is not a valid BV id");
            }
            println!("{aid}");
        }
    }
    Ok(())
}
