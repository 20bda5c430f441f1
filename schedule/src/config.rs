//! Tokenization configuration.
//!
//! Typed configuration with bon builders and environment variable fallbacks.

use bon::bon;

/// Data pointers a kernel may address at once. One of the twelve usable GPRs is
/// kept for runtime parameters.
pub const DEFAULT_DATA_PTR_GPR_COUNT: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizationConfig {
    /// Budget for parameters + results + hidden constants + buffers of one fused node.
    pub data_ptr_gpr_count: usize,
    /// Whether Transpose nodes are tokenized by the pass driver.
    pub tokenize_transpose: bool,
}

impl Default for TokenizationConfig {
    fn default() -> Self {
        Self { data_ptr_gpr_count: DEFAULT_DATA_PTR_GPR_COUNT, tokenize_transpose: true }
    }
}

#[bon]
impl TokenizationConfig {
    #[builder]
    pub fn builder(
        #[builder(default = DEFAULT_DATA_PTR_GPR_COUNT)] data_ptr_gpr_count: usize,
        #[builder(default = true)] tokenize_transpose: bool,
    ) -> Self {
        Self { data_ptr_gpr_count, tokenize_transpose }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `WELD_DATA_PTR_GPRS` - Data pointer budget (default: 11)
    /// * `WELD_NO_TRANSPOSE_TOKENIZATION` - Leave Transpose nodes unfused if set
    pub fn from_env() -> Self {
        let data_ptr_gpr_count = std::env::var("WELD_DATA_PTR_GPRS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DATA_PTR_GPR_COUNT);
        let tokenize_transpose = std::env::var("WELD_NO_TRANSPOSE_TOKENIZATION").is_err();

        Self { data_ptr_gpr_count, tokenize_transpose }
    }
}
