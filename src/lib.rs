/*!
 * Pixelwatch - marketing pixel health monitoring
 *
 * Browser snippets on monitored sites report heartbeats describing whether
 * Google Tag Manager, GA4 and the Meta Pixel are present and firing. The
 * `pulsar` crate stores them and keeps a rolling status per site; the
 * `pixelwatch-server` crate exposes the ingest endpoint and read API. This
 * crate provides configuration, logging and the `pixelwatch` CLI.
 */

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

pub use config::{LogLevel, PixelwatchConfig};
pub use error::{AppError, Result};
