use std::path::PathBuf;

use clap::Parser;

use flipbook::Size;

fn parse_size(text: &str) -> Result<Size, String> {
    Size::parse(text).ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{text}'"))
}

/// Play an animated image headlessly, logging each frame
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Animated image to play (GIF, WebP, or a still PNG/JPEG/BMP)
    #[arg(value_name = "FILE", required_unless_present = "list_formats")]
    pub file: Option<PathBuf>,

    /// Decoder to use instead of sniffing the file
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Playback speed in percent of normal
    #[arg(long, value_name = "PCT")]
    pub speed: Option<u32>,

    /// Keep every decoded frame in memory
    #[arg(long)]
    pub cache_all: bool,

    /// Resample frames to this size
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub scale: Option<Size>,

    /// Write every shown frame as PNG into this directory
    #[arg(long, value_name = "DIR")]
    pub dump: Option<PathBuf>,

    /// Print the formats this build can decode and exit
    #[arg(long)]
    pub list_formats: bool,
}
