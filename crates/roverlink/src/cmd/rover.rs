use std::sync::Arc;

use roverlink_link::{
    CameraSource, DebugLog, LinkContext, LinkConfig, LogDriveSink, NoCamera, Role, StillCamera,
};
use tracing::info;

use crate::cmd::link::{
    install_ctrlc_handler, load_config, open_listen, parse_duration, wait_for_shutdown,
};
use crate::cmd::RoverArgs;
use crate::exit::{io_error, link_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: RoverArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(args.config.as_deref(), LinkConfig::rover())?;
    let video_interval = parse_duration(&args.video_interval)?;
    let context = LinkContext::new(config).map_err(|err| link_error("link setup", err))?;

    let camera: Arc<dyn CameraSource> = match &args.camera_image {
        Some(path) => Arc::new(StillCamera::new(path)),
        None => Arc::new(NoCamera),
    };
    let mut dispatcher = context
        .dispatcher(Role::Rover)
        .with_drive_sink(LogDriveSink)
        .with_camera(Arc::clone(&camera))
        .with_files_dir(&args.files_dir);
    if let Some(path) = &args.debug_log {
        let log = DebugLog::open(path)
            .map_err(|err| io_error(&format!("open {}", path.display()), err))?;
        dispatcher = dispatcher.with_debug_log(log);
    }

    let stream = open_listen(&args.link, context.config().read_timeout)?;
    let mut workers = context
        .spawn_workers(stream, dispatcher)
        .map_err(|err| link_error("start link", err))?;

    if args.camera_image.is_some() {
        if let Err(err) = context.spawn_video_feed(&mut workers, camera, video_interval) {
            context.shutdown();
            let _ = workers.join();
            return Err(link_error("start video feed", err));
        }
    }

    install_ctrlc_handler(context.cancel_token())?;
    info!(workers = ?workers.names(), "rover link up");

    wait_for_shutdown(&context, None);
    workers.join().map_err(|err| link_error("stop link", err))?;

    print_stats(&context.scheduler().stats(), format);
    Ok(SUCCESS)
}
