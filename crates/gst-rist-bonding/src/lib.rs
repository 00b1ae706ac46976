//! GStreamer plugin providing RIST bonding sink and source elements.
//!
//! - `rsristbondsink` — Sends packets via bonded RIST links with DWRR scheduling
//! - `rsristbondsrc` — Receives packets from bonded RIST links with jitter-buffer reassembly

use gst::glib;

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
    rsristbonding,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    env!("CARGO_PKG_VERSION"),
    "LGPL",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
