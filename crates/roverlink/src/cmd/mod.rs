use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use roverlink_frame::StreamKind;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod link;
pub mod rover;
pub mod station;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the rover end of the link.
    Rover(RoverArgs),
    /// Run the base station end of the link and issue requests.
    Station(StationArgs),
    /// Decode a captured byte stream and print its frames.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Rover(args) => rover::run(args, format),
        Command::Station(args) => station::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenLinkArgs {
    /// TCP address to accept the station on (e.g. 0.0.0.0:5600).
    #[arg(
        long,
        value_name = "ADDR",
        required_unless_present = "serial",
        conflicts_with = "serial"
    )]
    pub listen: Option<SocketAddr>,
    /// Serial radio device.
    #[arg(long, value_name = "PATH")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value_t = 57_600)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct ConnectLinkArgs {
    /// TCP address of the rover.
    #[arg(
        long,
        value_name = "ADDR",
        required_unless_present = "serial",
        conflicts_with = "serial"
    )]
    pub connect: Option<SocketAddr>,
    /// Serial radio device.
    #[arg(long, value_name = "PATH")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value_t = 57_600)]
    pub baud: u32,
    /// How long to keep retrying a refused TCP connect (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct RoverArgs {
    #[command(flatten)]
    pub link: ListenLinkArgs,
    /// Link configuration (JSON). Defaults to the rover topic layout.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Directory files are served from and received into.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub files_dir: PathBuf,
    /// Append status text from the station to this file.
    #[arg(long, value_name = "FILE")]
    pub debug_log: Option<PathBuf>,
    /// Image file served for photo and video requests.
    #[arg(long, value_name = "FILE")]
    pub camera_image: Option<PathBuf>,
    /// Delay between video captures while the feed is on.
    #[arg(long, default_value = "200ms")]
    pub video_interval: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PhotoKind {
    Hdp,
    Ldp,
}

impl From<PhotoKind> for StreamKind {
    fn from(kind: PhotoKind) -> Self {
        match kind {
            PhotoKind::Hdp => StreamKind::HighDefPhoto,
            PhotoKind::Ldp => StreamKind::LowDefPhoto,
        }
    }
}

#[derive(Args, Debug)]
pub struct StationArgs {
    #[command(flatten)]
    pub link: ConnectLinkArgs,
    /// Link configuration (JSON). Defaults to the station topic layout.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Directory received files and images are written to.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,
    /// Append status text from the rover to this file.
    #[arg(long, value_name = "FILE")]
    pub debug_log: Option<PathBuf>,
    /// Upload a local file to the rover.
    #[arg(long, value_name = "FILE")]
    pub send_file: Option<PathBuf>,
    /// Ask the rover to send back one of its files.
    #[arg(long, value_name = "NAME")]
    pub request_file: Option<String>,
    /// Ask the rover for a photo.
    #[arg(long, value_name = "KIND")]
    pub photo: Option<PhotoKind>,
    /// Start the video feed from camera CAM; -1 stops it.
    #[arg(long, value_name = "CAM", allow_negative_numbers = true)]
    pub video: Option<i8>,
    /// Send a status message.
    #[arg(long, value_name = "TEXT")]
    pub message: Option<String>,
    /// Stop after this long instead of waiting for Ctrl-C (e.g. 30s).
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding raw link bytes.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
