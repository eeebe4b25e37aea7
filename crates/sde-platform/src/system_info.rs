/// Represents the operating system kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Linux,
    MacOs,
    Windows,
    Unknown,
}

/// Represents the CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Unknown,
}

/// Host information used to pick default compiler targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    os: OsKind,
    arch: Arch,
}

impl SystemInfo {
    /// Builds an explicit system description.
    pub fn new(os: OsKind, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the current OS and architecture at compile time.
    pub fn detect() -> Self {
        let os = if cfg!(target_os = "macos") {
            OsKind::MacOs
        } else if cfg!(target_os = "linux") {
            OsKind::Linux
        } else if cfg!(target_os = "windows") {
            OsKind::Windows
        } else {
            OsKind::Unknown
        };

        let arch = if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::Unknown
        };

        Self { os, arch }
    }

    /// Returns the detected OS kind.
    pub fn os(&self) -> OsKind {
        self.os
    }

    /// Returns the detected CPU architecture.
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// True when running on Linux.
    pub fn is_linux(&self) -> bool {
        self.os == OsKind::Linux
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_consistent() {
        let a = SystemInfo::detect();
        let b = SystemInfo::detect();
        assert_eq!(a, b, "consecutive calls should return the same info");
    }

    #[test]
    fn detect_matches_cfg() {
        let info = SystemInfo::detect();
        assert_eq!(info.is_linux(), cfg!(target_os = "linux"));
    }

    #[test]
    fn explicit_construction() {
        let info = SystemInfo::new(OsKind::MacOs, Arch::Aarch64);
        assert_eq!(info.os(), OsKind::MacOs);
        assert_eq!(info.arch(), Arch::Aarch64);
        assert!(!info.is_linux());
    }

    #[test]
    fn system_info_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SystemInfo>();
    }
}
