//! GStreamer plugin for Strata bonded transport.
//!
//! - `stratasink` — Sends packets via bonded Strata links with DWRR scheduling
//! - `stratasrc`  — Receives packets from bonded Strata links with jitter-buffer reassembly

use gst::glib;

pub mod codec;
pub mod hls_upload;
pub mod pad;
pub mod sink;
pub mod src;
mod util;

fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    sink::register(Some(plugin))?;
    src::register(Some(plugin))?;
    Ok(())
}

gst::plugin_define!(
    strata,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    env!("CARGO_PKG_VERSION"),
    "LGPL",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
