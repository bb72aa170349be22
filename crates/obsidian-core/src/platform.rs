//! Host platform detection and the environment handed to rule evaluation.

use std::collections::HashMap;

/// Operating system family, named the way version metadata names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    /// Detect the OS this process is running on.
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        return OsFamily::Windows;

        #[cfg(target_os = "macos")]
        return OsFamily::MacOs;

        #[cfg(target_os = "linux")]
        return OsFamily::Linux;

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        compile_error!("Unsupported operating system");
    }

    /// The name used by `os.name` rule predicates and `natives` maps.
    /// Upstream metadata says "osx", not "macos".
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::MacOs => "osx",
            OsFamily::Linux => "linux",
        }
    }

    /// Separator between classpath entries on this OS.
    pub fn classpath_separator(&self) -> &'static str {
        match self {
            OsFamily::Windows => ";",
            _ => ":",
        }
    }
}

/// Processor architecture, named the way `os.arch` rule predicates name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X64,
    Arm32,
    Arm64,
}

impl Arch {
    /// Detect the architecture this process is running on.
    pub fn current() -> Self {
        #[cfg(target_arch = "x86")]
        return Arch::X86;

        #[cfg(target_arch = "x86_64")]
        return Arch::X64;

        #[cfg(target_arch = "arm")]
        return Arch::Arm32;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(not(any(
            target_arch = "x86",
            target_arch = "x86_64",
            target_arch = "arm",
            target_arch = "aarch64"
        )))]
        compile_error!("Unsupported architecture");
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x86_64",
            Arch::Arm32 => "arm",
            Arch::Arm64 => "aarch64",
        }
    }

    /// Pointer-width string used in templated native classifiers
    /// ("natives-windows-${arch}").
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X86 | Arch::Arm32 => "32",
            Arch::X64 | Arch::Arm64 => "64",
        }
    }
}

/// Everything rule evaluation is allowed to look at.
#[derive(Debug, Clone)]
pub struct RuleEnv {
    pub os: OsFamily,
    pub os_version: String,
    pub arch: Arch,
    pub features: HashMap<String, bool>,
}

impl RuleEnv {
    /// Build an environment describing the host, with no features set.
    pub fn current() -> Self {
        Self {
            os: OsFamily::current(),
            os_version: sysinfo::System::long_os_version().unwrap_or_default(),
            arch: Arch::current(),
            features: HashMap::new(),
        }
    }

    pub fn with_feature(mut self, key: &str, value: bool) -> Self {
        self.features.insert(key.to_string(), value);
        self
    }
}
