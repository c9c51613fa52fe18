//! Pure trust-tier decision table, separated from all filesystem I/O so the
//! policy itself is unit-testable.

use crate::core::config::WidgetLocation;

/// Outcome of the checksum policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustRuling {
    /// Execution permitted.
    Valid,
    /// Execution permitted, but the result carries a user-visible warning.
    Warning,
    /// Execution denied.
    Rejected,
}

/// Evaluate the checksum trust table for a resolved widget.
///
/// `checksum_present` means: for bundled widgets, the file name appears in the
/// build-time-embedded table; for custom/override widgets, the user supplied a
/// `sha256` in configuration. Match/mismatch of a *present* checksum is not a
/// policy question; a mismatch is always a rejection, decided by the caller.
///
/// Dev-mode downgrades custom-widget checksum absence to informational. It
/// never relaxes bundled-widget enforcement.
#[must_use]
pub const fn evaluate(
    location: WidgetLocation,
    checksum_present: bool,
    require_checksums: bool,
    dev_mode: bool,
) -> TrustRuling {
    match location {
        WidgetLocation::Bundled => {
            if checksum_present {
                TrustRuling::Valid
            } else {
                // A bundled widget missing from the embedded table is
                // indistinguishable from tampering.
                TrustRuling::Rejected
            }
        }
        WidgetLocation::Custom => {
            if checksum_present {
                TrustRuling::Valid
            } else if dev_mode {
                TrustRuling::Warning
            } else if require_checksums {
                TrustRuling::Rejected
            } else {
                TrustRuling::Warning
            }
        }
    }
}
