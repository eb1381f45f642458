//! Shell orchestration: configuration, reporter, context, registry, render loop.
//!
//! Functions:
//!
//! - [`run`] dispatches the subcommands and otherwise runs the shell.
//! - `resolve_config` layers defaults, the config file, and CLI overrides.
//! - `run_shell` creates the context, loads the shaders while the context is
//!   current on the main thread, then hands both to the render scheduler until
//!   the window closes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use appconfig::{AppConfig, ApiConfig, TimestampMode};
use renderer::{
    ApiVersion, Context, FrameOptions, HeadlessDisplay, HeadlessOptions, Profile,
    RenderScheduler, ShaderLoader, ShaderRegistry, VideoMode,
};
use reporter::{MonotonicClock, Reporter, TimestampFormat, WallClock, CATALOG};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, RunArgs};
use crate::paths::AppPaths;

const DEFAULT_FILTER: &str = "warn,leto=info,renderer=info,reporter=info,naga=error,wgpu=error";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Some(Command::Problems) => {
            print_problems();
            Ok(())
        }
        Some(Command::Paths) => print_paths(),
        None => {
            let config = resolve_config(&cli.run)?;
            run_shell(config)
        }
    }
}

fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_problems() {
    println!("{:<16} {:<8} {:<9} {:<7} DESCRIPTION", "NAME", "SEVERITY", "CATEGORY", "CODE");
    for descriptor in CATALOG.iter() {
        let severity = if descriptor.fatal { "fatal" } else { "warning" };
        println!(
            "{:<16} {:<8} {:<9} 0x{:<5x} {}",
            descriptor.name,
            severity,
            descriptor.category,
            descriptor.category.code(),
            descriptor.description
        );
    }
}

fn print_paths() -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("config dir:  {}", paths.config_dir().display());
    println!("config file: {}", paths.config_file().display());
    Ok(())
}

fn resolve_config(args: &RunArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => {
            let paths = AppPaths::discover()?;
            let default_file = paths.config_file();
            if default_file.is_file() {
                load_config_file(&default_file)?
            } else {
                debug!(path = %default_file.display(), "no config file; using defaults");
                AppConfig::default()
            }
        }
    };

    if let Some(assets) = &args.assets {
        config.asset_root = assets.clone();
    }
    if !args.shaders.is_empty() {
        config.shaders = args.shaders.clone();
    }
    if let Some(frames) = args.frames {
        config.headless.frames = Some(frames);
    }
    if let Some(title) = &args.title {
        config.title = title.clone();
    }
    if args.no_notify {
        config.notifications = false;
    }

    config
        .validate()
        .context("invalid configuration after applying command-line overrides")?;
    Ok(config)
}

/// Loads `path`, resolving a relative asset root against the file's directory.
fn load_config_file(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    if config.asset_root.is_relative() {
        if let Some(parent) = path.parent() {
            config.asset_root = parent.join(&config.asset_root);
        }
    }
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

fn build_reporter(config: &AppConfig) -> Reporter {
    let builder = match config.timestamp {
        TimestampMode::Elapsed => Reporter::builder().clock(MonotonicClock::new()),
        TimestampMode::Wall => Reporter::builder().clock(WallClock),
    };
    if config.notifications {
        builder.build()
    } else {
        builder.without_notifier().build()
    }
}

fn api_version(api: &ApiConfig) -> ApiVersion {
    ApiVersion {
        major: api.major,
        minor: api.minor,
        profile: if api.core {
            Profile::Core
        } else {
            Profile::Compatibility
        },
    }
}

fn headless_options(config: &AppConfig) -> HeadlessOptions {
    HeadlessOptions {
        video_mode: VideoMode {
            width: config.headless.width,
            height: config.headless.height,
            refresh_rate: config.headless.refresh_rate,
        },
        close_after: config.headless.frames,
        frame_interval: config.headless.frame_interval,
        ..HeadlessOptions::default()
    }
}

fn run_shell(config: AppConfig) -> Result<()> {
    let reporter = Arc::new(build_reporter(&config));
    debug!(notifications = config.notifications, "reporter ready");

    let display = HeadlessDisplay::new(headless_options(&config));
    let mut context = Context::new(reporter.clone(), display).with_api(api_version(&config.api));
    context.create(&config.title);

    let loader = ShaderLoader::new(reporter.clone(), &config.asset_root);
    let mut registry = ShaderRegistry::empty(loader);
    {
        let gfx = context
            .graphics_mut()
            .ok_or_else(|| anyhow!("graphics backend unavailable after context creation"))?;
        for name in &config.shaders {
            registry.append(gfx, Some(name.as_str()));
        }
    }
    info!(
        shaders = registry.len(),
        asset_root = %config.asset_root.display(),
        "shader registry populated"
    );

    let scheduler = RenderScheduler::new(FrameOptions {
        clear_color: config.clear_color,
        active_shader: config.active_shader().map(str::to_owned),
    });
    let mut summary = scheduler
        .run(&mut context, registry)
        .context("render loop failed")?;

    if let Some(gfx) = context.graphics_mut() {
        summary.registry.destroy(gfx);
    }
    context.destroy();

    info!(
        frames_requested = summary.frames_requested,
        frames_rendered = summary.frames_rendered,
        graphics_errors = summary.graphics_errors,
        uptime = %reporter.timestamp(TimestampFormat::Shortened),
        "shell exited cleanly"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leto.toml");
        fs::write(
            &path,
            "title = \"From File\"\nasset_root = \"assets\"\nshaders = [\"basic\"]\n",
        )
        .unwrap();

        let args = RunArgs {
            config: Some(path),
            shaders: vec!["waves".into()],
            frames: Some(4),
            no_notify: true,
            ..RunArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.title, "From File");
        assert_eq!(config.asset_root, dir.path().join("assets"));
        assert_eq!(config.shaders, vec!["waves".to_string()]);
        assert_eq!(config.headless.frames, Some(4));
        assert!(!config.notifications);
    }

    #[test]
    fn explicit_assets_are_not_rebased() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leto.toml");
        fs::write(&path, "").unwrap();
        let args = RunArgs {
            config: Some(path),
            assets: Some(PathBuf::from("elsewhere")),
            ..RunArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.asset_root, PathBuf::from("elsewhere"));
    }

    #[test]
    fn zero_frames_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leto.toml");
        fs::write(&path, "").unwrap();
        let args = RunArgs {
            config: Some(path),
            frames: Some(0),
            ..RunArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn api_config_maps_to_profile() {
        let api = api_version(&ApiConfig {
            major: 3,
            minor: 3,
            core: false,
        });
        assert_eq!(api.profile, Profile::Compatibility);
        assert_eq!(api_version(&ApiConfig::default()), ApiVersion::default());
    }
}
