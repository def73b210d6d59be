//! Host platform identification.
//!
//! The `(os, arch)` pair selects which embedded Carabiner binary to extract,
//! by exact match on the resource key `Carabiner_<os>_<arch>`. A platform we
//! don't recognise keeps its normalized raw name, so lookup falls through to
//! "no compatible binary" rather than picking a wrong one.

use std::fmt;

/// Prefix shared by every binary resource key.
pub const RESOURCE_PREFIX: &str = "Carabiner";

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Os {
    Mac,
    Win,
    Linux,
    /// Lower-cased, whitespace-free host name for anything else.
    Other(String),
}

impl Os {
    /// Classify a host OS name such as `"Mac OS X"`, `"macos"`, or `"Windows 10"`.
    pub fn classify(raw: &str) -> Self {
        let name = normalize(raw);
        match name.as_str() {
            "mac" | "macos" | "macosx" => Os::Mac,
            _ if name.contains("windows") => Os::Win,
            _ if name.contains("linux") => Os::Linux,
            _ => Os::Other(name),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Mac => f.write_str("Mac"),
            Os::Win => f.write_str("Win"),
            Os::Linux => f.write_str("Linux"),
            Os::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X64,
    Arm,
    Arm64,
    /// Lower-cased, whitespace-free host name for anything else.
    Other(String),
}

impl Arch {
    /// Classify a host architecture name such as `"amd64"` or `"aarch64"`.
    pub fn classify(raw: &str) -> Self {
        let name = normalize(raw);
        match name.as_str() {
            "i386" | "x86" => Arch::X86,
            "amd64" | "x86_64" => Arch::X64,
            "aarch64" => Arch::Arm64,
            "armhf" | "aarch32" | "armv7l" | "arm" => Arch::Arm,
            _ => Arch::Other(name),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86 => f.write_str("x86"),
            Arch::X64 => f.write_str("x64"),
            Arch::Arm => f.write_str("arm"),
            Arch::Arm64 => f.write_str("arm64"),
            Arch::Other(name) => f.write_str(name),
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// PlatformIdentifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformIdentifier {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformIdentifier {
    /// Identify the platform this process was compiled for.
    pub fn identify() -> Self {
        Self::from_host(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Build an identifier from raw host facts.
    pub fn from_host(os_name: &str, arch_name: &str) -> Self {
        Self {
            os: Os::classify(os_name),
            arch: Arch::classify(arch_name),
        }
    }

    /// Name under which a compatible binary would be registered.
    pub fn resource_key(&self) -> String {
        format!("{RESOURCE_PREFIX}_{}_{}", self.os, self.arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Win
    }
}

impl fmt::Display for PlatformIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
