//! Script validation: resolves a widget path through the tiered search order
//! and enforces the trust rules before every execution.
//!
//! Validation is deliberately re-run from scratch on each refresh tick: the
//! checksum is recomputed from file bytes every time, so tampering between
//! two runs of the same widget is caught on the next execution rather than
//! only at startup.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::{PathsConfig, SecurityConfig, WidgetConfig, WidgetLocation};
use crate::core::paths::{expand_home, has_parent_component, is_under_root};
use crate::trust::checksum::{BundledChecksums, checksum_matches, sha256_file};
use crate::trust::policy::{self, TrustRuling};

/// Upper bound on symlink hops while walking a chain. Breaking the chain at
/// this depth treats the path as an escape attempt rather than looping.
const MAX_SYMLINK_HOPS: usize = 40;

// ──────────────────── result model ────────────────────

/// Trust verdict for one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    Warning,
    Rejected,
}

/// Structured failure taxonomy. Reported, never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustFailure {
    NotFound,
    Tampered,
    ChecksumMismatch,
    MissingChecksum,
    PathTraversal,
    SymlinkEscape,
    NotExecutable,
}

impl TrustFailure {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Tampered => "tampered",
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::MissingChecksum => "missing-checksum",
            Self::PathTraversal => "path-traversal",
            Self::SymlinkEscape => "symlink-escape",
            Self::NotExecutable => "not-executable",
        }
    }
}

/// Outcome of trust evaluation. Created fresh on every execution.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub resolved_path: Option<PathBuf>,
    pub resolved_checksum: Option<String>,
    pub status: ValidationStatus,
    pub failure: Option<TrustFailure>,
    pub message: String,
}

impl ValidationResult {
    /// Whether the widget may execute (warnings still run).
    #[must_use]
    pub const fn is_runnable(&self) -> bool {
        !matches!(self.status, ValidationStatus::Rejected)
    }

    fn rejected(failure: TrustFailure, message: impl Into<String>) -> Self {
        Self {
            resolved_path: None,
            resolved_checksum: None,
            status: ValidationStatus::Rejected,
            failure: Some(failure),
            message: message.into(),
        }
    }
}

// ──────────────────── search roots ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Override,
    Custom,
    Bundled,
}

impl RootKind {
    const fn as_location(self) -> WidgetLocation {
        match self {
            Self::Bundled => WidgetLocation::Bundled,
            Self::Override | Self::Custom => WidgetLocation::Custom,
        }
    }
}

struct SearchRoot {
    kind: RootKind,
    dir: PathBuf,
    /// Canonical form for symlink-escape prefix checks (roots themselves may
    /// be symlinks, e.g. /tmp on some systems).
    canonical: PathBuf,
}

// ──────────────────── validator ────────────────────

/// Evaluates widget trust against the configured roots and policy.
pub struct ScriptValidator<'a> {
    paths: &'a PathsConfig,
    security: &'a SecurityConfig,
    bundled: &'a BundledChecksums,
}

impl<'a> ScriptValidator<'a> {
    pub fn new(
        paths: &'a PathsConfig,
        security: &'a SecurityConfig,
        bundled: &'a BundledChecksums,
    ) -> Self {
        Self {
            paths,
            security,
            bundled,
        }
    }

    /// Validate one widget for execution.
    pub fn validate(&self, widget: &WidgetConfig) -> ValidationResult {
        let roots = self.search_roots();
        if roots.is_empty() {
            return ValidationResult::rejected(
                TrustFailure::NotFound,
                "no widget search roots are available",
            );
        }

        let raw = Path::new(&widget.path);
        let resolved = if raw.components().count() > 1 || raw.is_absolute() {
            Self::resolve_explicit(raw, &roots)
        } else {
            Self::resolve_shorthand(&widget.path, &roots)
        };

        let (path, kind) = match resolved {
            Ok(found) => found,
            Err(result) => return result,
        };

        if let Err(result) = Self::check_executable(&path) {
            return result;
        }

        self.check_trust(widget, &path, kind)
    }

    fn search_roots(&self) -> Vec<SearchRoot> {
        let mut candidates: Vec<(RootKind, &Path)> = Vec::new();
        if let Some(dir) = &self.paths.override_dir {
            candidates.push((RootKind::Override, dir));
        }
        if self.security.allow_user_widgets {
            candidates.push((RootKind::Custom, &self.paths.custom_dir));
        }
        candidates.push((RootKind::Bundled, &self.paths.bundled_dir));

        candidates
            .into_iter()
            .filter_map(|(kind, dir)| {
                // A root that does not exist cannot resolve anything and must
                // not silently pass prefix checks for nonexistent prefixes.
                let canonical = fs::canonicalize(dir).ok()?;
                Some(SearchRoot {
                    kind,
                    dir: dir.to_path_buf(),
                    canonical,
                })
            })
            .collect()
    }

    /// Shorthand names search the roots in precedence order; first hit wins.
    fn resolve_shorthand(
        name: &str,
        roots: &[SearchRoot],
    ) -> std::result::Result<(PathBuf, RootKind), ValidationResult> {
        for root in roots {
            let candidate = root.dir.join(name);
            match fs::symlink_metadata(&candidate) {
                Ok(meta) if meta.is_file() || meta.file_type().is_symlink() => {
                    let resolved = resolve_chain_within(&candidate, roots)?;
                    return Ok(resolved);
                }
                _ => {}
            }
        }
        Err(ValidationResult::rejected(
            TrustFailure::NotFound,
            format!("widget {name:?} not found in any search root"),
        ))
    }

    /// Explicit paths must be absolute (after `~` expansion), free of `..`,
    /// and stay inside an allowed root across every symlink hop.
    fn resolve_explicit(
        raw: &Path,
        roots: &[SearchRoot],
    ) -> std::result::Result<(PathBuf, RootKind), ValidationResult> {
        let expanded = expand_home(raw);

        if has_parent_component(&expanded) {
            return Err(ValidationResult::rejected(
                TrustFailure::PathTraversal,
                format!("path {} contains parent-directory components", expanded.display()),
            ));
        }
        if !expanded.is_absolute() {
            return Err(ValidationResult::rejected(
                TrustFailure::PathTraversal,
                format!("explicit widget path {} must be absolute", expanded.display()),
            ));
        }

        // The literal path must already sit under an allowed root; the
        // symlink walk then re-checks every hop against canonical roots.
        if !roots
            .iter()
            .any(|root| is_under_root(&expanded, &root.dir) || is_under_root(&expanded, &root.canonical))
        {
            return Err(ValidationResult::rejected(
                TrustFailure::PathTraversal,
                format!("path {} is outside the allowed widget roots", expanded.display()),
            ));
        }

        resolve_chain_within(&expanded, roots)
    }

    fn check_executable(path: &Path) -> std::result::Result<(), ValidationResult> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(path).map_err(|_| {
                ValidationResult::rejected(
                    TrustFailure::NotFound,
                    format!("cannot stat {}", path.display()),
                )
            })?;
            if meta.permissions().mode() & 0o111 == 0 {
                return Err(ValidationResult::rejected(
                    TrustFailure::NotExecutable,
                    format!("{} is not executable", path.display()),
                ));
            }
        }
        #[cfg(not(unix))]
        {
            let _ = path;
        }
        Ok(())
    }

    /// Checksum verification and the trust-tier decision table.
    fn check_trust(
        &self,
        widget: &WidgetConfig,
        path: &Path,
        kind: RootKind,
    ) -> ValidationResult {
        // Fresh hash on every call; never trust a cached value.
        let actual = match sha256_file(path) {
            Ok(hex) => hex,
            Err(error) => {
                return ValidationResult::rejected(
                    TrustFailure::NotFound,
                    format!("cannot hash {}: {error}", path.display()),
                );
            }
        };

        let location = kind.as_location();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let expected = match location {
            WidgetLocation::Bundled => self.bundled.expected(&file_name).map(str::to_string),
            WidgetLocation::Custom => widget.sha256.clone(),
        };

        if let Some(expected) = &expected {
            if !checksum_matches(expected, &actual) {
                let failure = match location {
                    WidgetLocation::Bundled => TrustFailure::Tampered,
                    WidgetLocation::Custom => TrustFailure::ChecksumMismatch,
                };
                return ValidationResult {
                    resolved_path: Some(path.to_path_buf()),
                    resolved_checksum: Some(actual.clone()),
                    status: ValidationStatus::Rejected,
                    failure: Some(failure),
                    message: format!(
                        "{}: checksum {actual} does not match expected {expected}",
                        path.display()
                    ),
                };
            }
        }

        match policy::evaluate(
            location,
            expected.is_some(),
            self.security.require_checksums,
            self.security.dev_mode,
        ) {
            TrustRuling::Valid => ValidationResult {
                resolved_path: Some(path.to_path_buf()),
                resolved_checksum: Some(actual),
                status: ValidationStatus::Valid,
                failure: None,
                message: String::new(),
            },
            TrustRuling::Warning => {
                let message = if self.security.dev_mode {
                    format!("dev mode: running {} without a checksum", path.display())
                } else {
                    format!("no checksum configured for {}", path.display())
                };
                ValidationResult {
                    resolved_path: Some(path.to_path_buf()),
                    resolved_checksum: Some(actual),
                    status: ValidationStatus::Warning,
                    failure: None,
                    message,
                }
            }
            TrustRuling::Rejected => {
                let failure = match location {
                    WidgetLocation::Bundled => TrustFailure::Tampered,
                    WidgetLocation::Custom => TrustFailure::MissingChecksum,
                };
                let message = match failure {
                    TrustFailure::Tampered => format!(
                        "{file_name:?} is not in the bundled checksum table"
                    ),
                    _ => format!(
                        "custom widget {} requires a sha256 (security.require_checksums)",
                        path.display()
                    ),
                };
                ValidationResult {
                    resolved_path: Some(path.to_path_buf()),
                    resolved_checksum: Some(actual),
                    status: ValidationStatus::Rejected,
                    failure: Some(failure),
                    message,
                }
            }
        }
    }
}

// ──────────────────── symlink chain walk ────────────────────

/// Follow a symlink chain hop by hop, prefix-checking every intermediate
/// target against the canonical roots. A single `canonicalize` at the end is
/// not enough: an intermediate hop may point outside an allowed root even
/// when the final target happens to land back inside one.
fn resolve_chain_within(
    start: &Path,
    roots: &[SearchRoot],
) -> std::result::Result<(PathBuf, RootKind), ValidationResult> {
    let mut current = start.to_path_buf();

    for _ in 0..MAX_SYMLINK_HOPS {
        let Some(kind) = root_containing(&current, roots) else {
            return Err(ValidationResult::rejected(
                TrustFailure::SymlinkEscape,
                format!("{} resolves outside the allowed widget roots", current.display()),
            ));
        };

        let meta = match fs::symlink_metadata(&current) {
            Ok(meta) => meta,
            Err(_) => {
                return Err(ValidationResult::rejected(
                    TrustFailure::NotFound,
                    format!("{} does not exist", current.display()),
                ));
            }
        };

        if !meta.file_type().is_symlink() {
            // Final canonical check still applies: parent directories of a
            // non-symlink file can themselves be symlinks.
            let canonical = fs::canonicalize(&current).map_err(|_| {
                ValidationResult::rejected(
                    TrustFailure::NotFound,
                    format!("{} cannot be canonicalized", current.display()),
                )
            })?;
            if !roots
                .iter()
                .any(|root| is_under_root(&canonical, &root.canonical))
            {
                return Err(ValidationResult::rejected(
                    TrustFailure::SymlinkEscape,
                    format!(
                        "{} canonicalizes to {} outside the allowed widget roots",
                        current.display(),
                        canonical.display()
                    ),
                ));
            }
            let kind = root_containing(&canonical, roots).unwrap_or(kind);
            return Ok((canonical, kind));
        }

        let target = fs::read_link(&current).map_err(|_| {
            ValidationResult::rejected(
                TrustFailure::NotFound,
                format!("cannot read symlink {}", current.display()),
            )
        })?;
        current = if target.is_absolute() {
            target
        } else {
            current
                .parent()
                .map_or_else(|| target.clone(), |parent| parent.join(&target))
        };
        current = crate::core::paths::resolve_absolute_path(&current);
    }

    Err(ValidationResult::rejected(
        TrustFailure::SymlinkEscape,
        format!("{} exceeds {MAX_SYMLINK_HOPS} symlink hops", start.display()),
    ))
}

fn root_containing(path: &Path, roots: &[SearchRoot]) -> Option<RootKind> {
    roots
        .iter()
        .find(|root| is_under_root(path, &root.dir) || is_under_root(path, &root.canonical))
        .map(|root| root.kind)
}

// ──────────────────── tests ────────────────────
