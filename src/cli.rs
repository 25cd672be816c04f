use clap::Parser;
use std::path::PathBuf;

/// Side-by-side swing comparison with synchronized playback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Recording catalog (JSON array of recordings with keyframes)
    #[arg(long = "catalog", value_name = "FILE")]
    pub catalog: PathBuf,

    /// Recording for the left slot (id or title)
    #[arg(short = 'L', long = "left", value_name = "QUERY")]
    pub left: Option<String>,

    /// Recording for the right slot (id or title)
    #[arg(short = 'R', long = "right", value_name = "QUERY")]
    pub right: Option<String>,

    /// Jump both slots to this common keyframe before playing
    #[arg(short = 'k', long = "keyframe", value_name = "NAME")]
    pub keyframe: Option<String>,

    /// Playback rate (e.g. 0.25 for slow motion)
    #[arg(short = 'r', long = "rate", value_name = "RATE")]
    pub rate: Option<f64>,

    /// Run the transport for this long, 0 to skip playback
    #[arg(short = 'p', long = "play-ms", value_name = "MS", default_value = "2000")]
    pub play_ms: u64,

    /// List catalog recordings and exit
    #[arg(long = "list")]
    pub list: bool,

    /// Enable debug logging to file (default: swingsync.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let args = Args::try_parse_from([
            "swingsync",
            "--catalog",
            "catalog.json",
            "--left",
            "monday",
            "-R",
            "friday",
            "-k",
            "impact",
            "--rate",
            "0.5",
            "-vv",
            "-l",
        ])
        .unwrap();
        assert_eq!(args.catalog, PathBuf::from("catalog.json"));
        assert_eq!(args.left.as_deref(), Some("monday"));
        assert_eq!(args.right.as_deref(), Some("friday"));
        assert_eq!(args.keyframe.as_deref(), Some("impact"));
        assert_eq!(args.rate, Some(0.5));
        assert_eq!(args.play_ms, 2000);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }

    #[test]
    fn test_catalog_required() {
        assert!(Args::try_parse_from(["swingsync"]).is_err());
    }
}
