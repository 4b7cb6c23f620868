use roverlink_link::config::{ALL, FILE};
use roverlink_link::{commands, DebugLog, DirectoryImageSink, LinkConfig, LinkContext, Role};
use tracing::info;

use crate::cmd::link::{
    install_ctrlc_handler, load_config, open_connect, parse_duration, wait_for_shutdown,
};
use crate::cmd::StationArgs;
use crate::exit::{io_error, link_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: StationArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(args.config.as_deref(), LinkConfig::station())?;
    let limit = args.duration.as_deref().map(parse_duration).transpose()?;
    let context = LinkContext::new(config).map_err(|err| link_error("link setup", err))?;

    std::fs::create_dir_all(&args.out_dir)
        .map_err(|err| io_error(&format!("create {}", args.out_dir.display()), err))?;
    let mut dispatcher = context
        .dispatcher(Role::Station)
        .with_image_sink(DirectoryImageSink::new(&args.out_dir))
        .with_files_dir(&args.out_dir);
    if let Some(path) = &args.debug_log {
        let log = DebugLog::open(path)
            .map_err(|err| io_error(&format!("open {}", path.display()), err))?;
        dispatcher = dispatcher.with_debug_log(log);
    }

    let stream = open_connect(&args.link, context.config().read_timeout)?;
    let workers = context
        .spawn_workers(stream, dispatcher)
        .map_err(|err| link_error("start link", err))?;

    if let Err(err) = queue_requests(&context, &args) {
        context.shutdown();
        let _ = workers.join();
        return Err(link_error("queue request", err));
    }

    install_ctrlc_handler(context.cancel_token())?;
    info!(workers = ?workers.names(), "station link up");

    wait_for_shutdown(&context, limit);
    workers.join().map_err(|err| link_error("stop link", err))?;

    print_stats(&context.scheduler().stats(), format);
    Ok(SUCCESS)
}

fn queue_requests(context: &LinkContext, args: &StationArgs) -> roverlink_link::Result<()> {
    let scheduler = context.scheduler();
    if let Some(path) = &args.send_file {
        commands::send_file(scheduler, path, FILE)?;
    }
    if let Some(name) = &args.request_file {
        let id = commands::request_file(scheduler, name, ALL)?;
        info!(id, name = %name, "file requested");
    }
    if let Some(kind) = args.photo {
        let id = commands::request_photo(scheduler, kind.into(), ALL)?;
        info!(id, ?kind, "photo requested");
    }
    if let Some(camera) = args.video {
        let id = commands::request_video(scheduler, camera, ALL)?;
        info!(id, camera, "video requested");
    }
    if let Some(text) = &args.message {
        commands::send_text(scheduler, text, ALL)?;
    }
    Ok(())
}
