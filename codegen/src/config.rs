//! Kernel generation configuration.

use bon::bon;

use crate::isa::Isa;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelConfig {
    /// Pin code generation to one profile instead of the widest supported one.
    pub isa: Option<Isa>,
    /// Wrap every emitter with trace instrumentation.
    pub debug_caps: bool,
}

#[bon]
impl KernelConfig {
    #[builder]
    pub fn builder(isa: Option<Isa>, #[builder(default)] debug_caps: bool) -> Self {
        Self { isa, debug_caps }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `WELD_ISA` - Profile name such as `avx2` or `asimd` (default: widest supported)
    /// * `WELD_DEBUG_CAPS` - Enable emitter tracing if set to `1` or `true`
    pub fn from_env() -> Self {
        let isa = std::env::var("WELD_ISA").ok().and_then(|s| s.parse().ok());
        let debug_caps = matches!(std::env::var("WELD_DEBUG_CAPS").as_deref(), Ok("1") | Ok("true"));

        Self { isa, debug_caps }
    }
}
