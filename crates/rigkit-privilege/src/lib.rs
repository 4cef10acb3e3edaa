//! Elevation policy check before a case's runner is invoked
//! (SPEC_FULL.md §4.11). Elevation detection is host-OS specific and is
//! the only other platform-specific surface in the core besides forced
//! process termination.

use rigkit_manifest::Privilege;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("Privilege.Required: case requires an elevated process and the current process is not elevated")]
    Required,
}

/// Outcome of a privilege-gate check that did not hard-fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeOutcome {
    /// `user`, or `adminPreferred` while already elevated: nothing to report.
    Clear,
    /// `adminPreferred` while not elevated: proceed, but the caller should
    /// emit a warning event.
    PreferredButNotElevated,
}

/// Checks whether the current process is running with elevated privileges.
/// Implemented per-OS; there is no portable notion of "elevated" in std.
pub trait ElevationProbe {
    fn is_elevated(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostElevationProbe;

#[cfg(unix)]
impl ElevationProbe for HostElevationProbe {
    fn is_elevated(&self) -> bool {
        nix::unistd::Uid::effective().is_root()
    }
}

#[cfg(windows)]
impl ElevationProbe for HostElevationProbe {
    fn is_elevated(&self) -> bool {
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        #[allow(unsafe_code)]
        unsafe {
            let mut token = HANDLE::default();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                return false;
            }
            let mut elevation = TOKEN_ELEVATION::default();
            let mut returned_len = 0u32;
            let ok = GetTokenInformation(
                token,
                TokenElevation,
                Some(std::ptr::from_mut(&mut elevation).cast()),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut returned_len,
            )
            .is_ok();
            let _ = CloseHandle(token);
            ok && elevation.TokenIsElevated != 0
        }
    }
}

#[cfg(not(any(unix, windows)))]
impl ElevationProbe for HostElevationProbe {
    fn is_elevated(&self) -> bool {
        false
    }
}

/// Policy resolution (spec.md §4.11):
/// - `adminRequired` and not elevated → hard failure before invoking the runner.
/// - `adminPreferred` and not elevated → warn, proceed.
/// - `user` → no check.
pub fn check(
    privilege: Option<Privilege>,
    probe: &dyn ElevationProbe,
) -> Result<PrivilegeOutcome, PrivilegeError> {
    match privilege.unwrap_or(Privilege::User) {
        Privilege::User => Ok(PrivilegeOutcome::Clear),
        Privilege::AdminPreferred => {
            if probe.is_elevated() {
                Ok(PrivilegeOutcome::Clear)
            } else {
                Ok(PrivilegeOutcome::PreferredButNotElevated)
            }
        }
        Privilege::AdminRequired => {
            if probe.is_elevated() {
                Ok(PrivilegeOutcome::Clear)
            } else {
                Err(PrivilegeError::Required)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(bool);
    impl ElevationProbe for FixedProbe {
        fn is_elevated(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn user_privilege_never_checks() {
        assert_eq!(check(Some(Privilege::User), &FixedProbe(false)).unwrap(), PrivilegeOutcome::Clear);
    }

    #[test]
    fn admin_required_fails_when_not_elevated() {
        assert_eq!(check(Some(Privilege::AdminRequired), &FixedProbe(false)).unwrap_err(), PrivilegeError::Required);
    }

    #[test]
    fn admin_required_passes_when_elevated() {
        assert_eq!(check(Some(Privilege::AdminRequired), &FixedProbe(true)).unwrap(), PrivilegeOutcome::Clear);
    }

    #[test]
    fn admin_preferred_warns_but_proceeds_when_not_elevated() {
        assert_eq!(
            check(Some(Privilege::AdminPreferred), &FixedProbe(false)).unwrap(),
            PrivilegeOutcome::PreferredButNotElevated
        );
    }

    #[test]
    fn no_privilege_declared_defaults_to_user() {
        assert_eq!(check(None, &FixedProbe(false)).unwrap(), PrivilegeOutcome::Clear);
    }
}
