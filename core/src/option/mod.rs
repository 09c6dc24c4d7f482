//! Typed, named configuration values with overridable defaults.
//!
//! Options are declared once at startup against an [`Options`] registry and
//! resolved lazily on first read. Overrides are layered: command-line beats
//! environment (`DAGRUN_OPT_*`) beats config file beats the declared
//! default. A default may be a literal, a lazy factory, or a per-platform
//! factory map; factories for other platforms are never evaluated.

mod registry;
mod types;

pub use registry::{OptionHandle, OptionInfo, Options, OptionSpec, OverrideLayer};
pub use types::OptionValue;
