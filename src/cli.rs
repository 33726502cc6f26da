// CLI definitions using clap

use clap::{Parser, Subcommand};
use miao_transport::parse_usb_id;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "miao-battery")]
#[command(author, version, about = "Angry Miao receiver battery reader")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List HID interfaces and show which one would be used
    #[command(visible_aliases = ["ls", "l"])]
    List {
        /// USB vendor ID (decimal, 0x1234 or 1234h)
        #[arg(long, value_parser = parse_usb_id)]
        vid: Option<u16>,
        /// USB product ID (decimal, 0x1234 or 1234h)
        #[arg(long, value_parser = parse_usb_id)]
        pid: Option<u16>,
        /// Show every HID interface, not just the receiver's
        #[arg(short, long)]
        all: bool,
    },

    /// Read the battery level once
    #[command(visible_aliases = ["bat", "b"])]
    Read {
        /// Raw HID path (skips discovery)
        #[arg(long)]
        path: Option<String>,
        /// USB vendor ID (decimal, 0x1234 or 1234h)
        #[arg(long, value_parser = parse_usb_id)]
        vid: Option<u16>,
        /// USB product ID (decimal, 0x1234 or 1234h)
        #[arg(long, value_parser = parse_usb_id)]
        pid: Option<u16>,
        /// Delay between activation and read in milliseconds
        #[arg(long, default_value_t = 50)]
        delay: u64,
        /// Attempts before giving up
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        retry: u32,
        /// Print only the percentage; failures only set the exit code
        #[arg(short, long)]
        quiet: bool,
        /// Dump the raw 0xF7 report instead of decoding it
        #[arg(long)]
        hex: bool,
    },

    /// Poll continuously and print every change (Ctrl-C to stop, SIGHUP reloads config)
    #[command(visible_aliases = ["poll", "w"])]
    Watch {
        /// Config file (default: ~/.config/miao-battery/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also export status as sysfs-like files into this directory
        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,
        /// Print only the percentage
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,
        /// Print one JSON object per change
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    #[command(visible_alias = "cfg")]
    Config {
        /// Config file (default: ~/.config/miao-battery/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
