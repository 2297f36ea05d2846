mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;

use cli::Args;
use flipbook::{CacheMode, DecoderRegistry, Movie, MovieEvent, PlaybackSettings};

fn list_formats(registry: &DecoderRegistry) {
    let animated = registry.animated_formats();
    for name in registry.supported_formats() {
        let marker = if animated.contains(&name) { " (animated)" } else { "" };
        println!("{name}{marker}");
    }
}

/// Log everything that happened since the last call, dumping shown frames.
fn drain_events(events: &Receiver<MovieEvent>, movie: &Movie, dump: Option<&PathBuf>) -> Result<()> {
    for event in events.try_iter() {
        match &event {
            MovieEvent::FrameChanged(n) => {
                log::debug!("Frame {n} (next in {} ms)", movie.next_frame_delay());
                if let (Some(dir), Some(image)) = (dump, movie.current_image()) {
                    let path = dir.join(format!("frame_{n:04}.png"));
                    image
                        .save_with_format(&path, image::ImageFormat::Png)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
            }
            MovieEvent::Error(e) => log::error!("Playback error: {e}"),
            other => log::info!("{other:?}"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let mut settings = PlaybackSettings::load();

    if args.list_formats {
        list_formats(&DecoderRegistry::new(settings.formats));
        return Ok(());
    }
    let Some(file) = args.file else {
        anyhow::bail!("no file given");
    };

    if let Some(speed) = args.speed {
        settings.speed = speed;
    }
    if args.cache_all {
        settings.cache_mode = CacheMode::All;
    }
    if args.scale.is_some() {
        settings.scaled_size = args.scale;
    }
    if let Some(dir) = &args.dump {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut movie = Movie::from_settings(&settings);
    let events = movie.subscribe();
    movie.set_format(args.format.as_deref());
    movie.set_file_name(&file);
    if !movie.is_valid() {
        let reason = movie
            .last_error()
            .map_or_else(|| "no readable frames".to_string(), |e| e.to_string());
        anyhow::bail!("cannot play {}: {reason}", file.display());
    }
    log::info!(
        "Playing {} ({}, {} frames, loop count {}, speed {}%)",
        file.display(),
        movie.format().unwrap_or("?"),
        movie.frame_count(),
        movie.loop_count(),
        movie.speed()
    );

    movie.start();
    drain_events(&events, &movie, args.dump.as_ref())?;
    while let Some(deadline) = movie.next_wake() {
        let now = std::time::Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        movie.poll();
        drain_events(&events, &movie, args.dump.as_ref())?;
    }
    Ok(())
}
