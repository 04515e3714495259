use once_cell::sync::Lazy;

/// Compile-time build metadata produced by `build.rs`.
#[derive(Debug, Clone, Copy)]
pub struct BuildMetadata {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub timestamp: &'static str,
    pub profile: &'static str,
}

/// Returns the statically-embedded build metadata.
pub fn current() -> BuildMetadata {
    BuildMetadata {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("QIF_CORE_BUILD_HASH").unwrap_or("unknown"),
        timestamp: option_env!("QIF_CORE_BUILD_TIMESTAMP").unwrap_or("unknown"),
        profile: option_env!("QIF_CORE_BUILD_PROFILE").unwrap_or("unknown"),
    }
}

static SUMMARY: Lazy<String> = Lazy::new(|| current().summary());

/// One-line version string, computed once.
pub fn summary() -> &'static str {
    SUMMARY.as_str()
}

impl BuildMetadata {
    pub fn summary(&self) -> String {
        format!(
            "qif_core {} ({} {}, built {})",
            self.version, self.git_hash, self.profile, self.timestamp
        )
    }
}
