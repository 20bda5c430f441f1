//! State shared by every executor of one compiled model.

use bon::bon;
use weld_codegen::KernelConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorContext {
    pub kernel_config: KernelConfig,
    /// Leave the reference interpreter out of the dispatch table.
    pub disable_reference: bool,
}

#[bon]
impl ExecutorContext {
    #[builder]
    pub fn builder(#[builder(default)] kernel_config: KernelConfig, #[builder(default)] disable_reference: bool) -> Self {
        Self { kernel_config, disable_reference }
    }

    /// Create context from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `WELD_ISA`, `WELD_DEBUG_CAPS` - See [`KernelConfig::from_env`]
    /// * `WELD_NO_REFERENCE` - Fail instead of falling back to the interpreter if set
    pub fn from_env() -> Self {
        let disable_reference = std::env::var("WELD_NO_REFERENCE").is_ok();
        Self { kernel_config: KernelConfig::from_env(), disable_reference }
    }
}
