use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use ptp_gadget_responder::bulk_worker::BulkWorker;
use ptp_gadget_responder::control::{self, ControlHandler};
use ptp_gadget_responder::encoding::Iso8859ToUcs2Le;
use ptp_gadget_responder::object_store::ObjectTable;
use ptp_gadget_responder::reset::ResetCoordinator;
use ptp_gadget_responder::thumbnail::{self, ExternalConverter};
use ptp_gadget_responder::transport::{GadgetfsBulkTransport, GadgetfsControlTransport};
use ptp_gadget_responder::PtpError;

/// Exposes a directory of JPEG/TIFF images as a USB still-image-capture
/// device speaking PTP (PIMA 15740) over a Linux USB gadgetfs mount.
#[derive(Parser, Debug)]
#[command(name = "ptp-gadget-responder", version, about)]
struct Cli {
    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory whose JPEG/TIFF files are presented as camera objects.
    root_directory: PathBuf,
}

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn run(cli: Cli) -> Result<(), PtpError> {
    if !cli.root_directory.is_dir() {
        return Err(PtpError::InvalidRoot(cli.root_directory));
    }

    let thumb_cache_dir = thumbnail::default_cache_dir();
    std::fs::create_dir_all(&thumb_cache_dir).map_err(|source| PtpError::ThumbnailCacheUnavailable(thumb_cache_dir.clone(), source))?;

    let encoder = Arc::new(Iso8859ToUcs2Le);
    let mut objects = ObjectTable::new(
        cli.root_directory.clone(),
        thumb_cache_dir,
        encoder.clone(),
        Arc::new(ExternalConverter::default()),
    );
    objects
        .enumerate()
        .map_err(|source| PtpError::Io { path: cli.root_directory.clone(), source })?;
    info!("serving {} objects from {}", objects.object_number(), cli.root_directory.display());

    let gadget_dir = control::default_gadget_dir();
    let profile = control::autoconfigure(&gadget_dir)?;
    info!("autoconfigured {} ({})", profile.driver_name, if profile.high_speed { "high-speed" } else { "full-speed" });

    let reset = ResetCoordinator::new();

    let bulk_transport = GadgetfsBulkTransport::open(&gadget_dir, "ep1in", "ep2out")
        .map_err(|source| PtpError::Io { path: gadget_dir.join("ep1in"), source })?;
    let worker_reset = reset.clone();
    let worker_handle = std::thread::Builder::new()
        .name("ptp-bulk-worker".into())
        .spawn(move || {
            let mut worker = BulkWorker::new(bulk_transport, objects, encoder, worker_reset);
            worker.run();
        })
        .expect("failed to spawn bulk worker thread");

    let control_transport = GadgetfsControlTransport::open(&gadget_dir.join("ep0"))
        .map_err(|source| PtpError::Io { path: gadget_dir.join("ep0"), source })?;
    let mut control_handler = ControlHandler::new(control_transport, profile, reset);
    control_handler.run();

    let _ = worker_handle.join();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(level_for(cli.verbose)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
