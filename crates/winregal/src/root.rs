//! Root keys and root-qualified path parsing.
//!
//! A registry path such as
//! `HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\Run`
//! (the form produced by regedit's "Copy Key Name") names its root in the
//! first component. The same key can also be addressed with an explicit root
//! and a relative path.

use crate::error::{RegError, RegResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between path components.
pub const PATH_SEPARATOR: char = '\\';

/// One of the predefined top-level registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    PerformanceData,
    CurrentConfig,
    DynData,
}

/// Fixed id/name table. Ids are the platform's predefined HKEY values.
static ROOT_TABLE: [(RootKey, u32, &str); 7] = [
    (RootKey::ClassesRoot, 0x8000_0000, "HKEY_CLASSES_ROOT"),
    (RootKey::CurrentUser, 0x8000_0001, "HKEY_CURRENT_USER"),
    (RootKey::LocalMachine, 0x8000_0002, "HKEY_LOCAL_MACHINE"),
    (RootKey::Users, 0x8000_0003, "HKEY_USERS"),
    (RootKey::PerformanceData, 0x8000_0004, "HKEY_PERFORMANCE_DATA"),
    (RootKey::CurrentConfig, 0x8000_0005, "HKEY_CURRENT_CONFIG"),
    (RootKey::DynData, 0x8000_0006, "HKEY_DYN_DATA"),
];

impl RootKey {
    /// Every root, in id order.
    pub const ALL: [RootKey; 7] = [
        RootKey::ClassesRoot,
        RootKey::CurrentUser,
        RootKey::LocalMachine,
        RootKey::Users,
        RootKey::PerformanceData,
        RootKey::CurrentConfig,
        RootKey::DynData,
    ];

    fn entry(self) -> &'static (RootKey, u32, &'static str) {
        // The table covers every variant.
        &ROOT_TABLE[self as usize]
    }

    /// Numeric identifier (the predefined HKEY value).
    pub fn id(self) -> u32 {
        self.entry().1
    }

    /// Canonical symbolic name, e.g. `HKEY_LOCAL_MACHINE`.
    pub fn name(self) -> &'static str {
        self.entry().2
    }

    /// Look up a root by numeric identifier.
    pub fn from_id(id: u32) -> RegResult<Self> {
        ROOT_TABLE
            .iter()
            .find(|(_, rid, _)| *rid == id)
            .map(|(root, _, _)| *root)
            .ok_or_else(|| RegError::UnknownRoot(format!("{:#x}", id)))
    }

    /// Look up a root by symbolic name, ignoring case.
    pub fn from_name(name: &str) -> RegResult<Self> {
        let upper = name.to_uppercase();
        ROOT_TABLE
            .iter()
            .find(|(_, _, rname)| *rname == upper)
            .map(|(root, _, _)| *root)
            .ok_or_else(|| RegError::UnknownRoot(upper))
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve a path and optional explicit root id into
/// `(root, root name, relative path)`.
///
/// Without `root_id` the first component of `path` must be a root name.
pub fn parse_path(path: &str, root_id: Option<u32>) -> RegResult<(RootKey, &'static str, String)> {
    let (root, relative) = match root_id {
        Some(id) => (RootKey::from_id(id)?, path),
        None => {
            let (first, rest) = match path.split_once(PATH_SEPARATOR) {
                Some((first, rest)) => (first, rest),
                None => (path, ""),
            };
            (RootKey::from_name(first)?, rest)
        }
    };
    Ok((root, root.name(), normalize_path(relative)))
}

/// Strip leading/trailing separators and collapse empty components.
pub fn normalize_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\\")
}

/// Join a relative path and a sub-path.
pub fn join_path(base: &str, sub: &str) -> String {
    let sub = normalize_path(sub);
    match (base.is_empty(), sub.is_empty()) {
        (true, _) => sub,
        (false, true) => base.to_string(),
        (false, false) => format!("{}{}{}", base, PATH_SEPARATOR, sub),
    }
}

/// Last component of a relative path (empty for the root itself).
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_variant() {
        for root in RootKey::ALL {
            assert_eq!(root.entry().0, root);
            assert_eq!(RootKey::from_id(root.id()).unwrap(), root);
            assert_eq!(RootKey::from_name(root.name()).unwrap(), root);
        }
    }

    #[test]
    fn test_parse_qualified_path() {
        let (root, name, rel) =
            parse_path("HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows", None).unwrap();
        assert_eq!(root, RootKey::LocalMachine);
        assert_eq!(name, "HKEY_LOCAL_MACHINE");
        assert_eq!(rel, "SOFTWARE\\Microsoft\\Windows");
    }

    #[test]
    fn test_parse_root_name_case_insensitive() {
        for path in ["hkey_current_user\\Software", "Hkey_Current_User\\Software"] {
            let (root, name, rel) = parse_path(path, None).unwrap();
            assert_eq!(root, RootKey::CurrentUser);
            assert!(name.eq_ignore_ascii_case(path.split('\\').next().unwrap()));
            assert_eq!(rel, "Software");
        }
    }

    #[test]
    fn test_parse_bare_root() {
        let (root, _, rel) = parse_path("HKEY_USERS", None).unwrap();
        assert_eq!(root, RootKey::Users);
        assert_eq!(rel, "");
    }

    #[test]
    fn test_parse_explicit_root() {
        let (root, name, rel) =
            parse_path("\\SOFTWARE\\Microsoft\\", Some(RootKey::LocalMachine.id())).unwrap();
        assert_eq!(root, RootKey::LocalMachine);
        assert_eq!(name, "HKEY_LOCAL_MACHINE");
        assert_eq!(rel, "SOFTWARE\\Microsoft");
    }

    #[test]
    fn test_unknown_root_name() {
        for path in ["HKEY_NOWHERE\\Software", "SOFTWARE\\Microsoft", "HKLM\\Software", ""] {
            assert!(matches!(parse_path(path, None), Err(RegError::UnknownRoot(_))));
        }
    }

    #[test]
    fn test_unknown_root_id() {
        let err = parse_path("Software", Some(0x1234)).unwrap_err();
        assert!(matches!(err, RegError::UnknownRoot(_)));
        assert!(err.to_string().contains("0x1234"));
    }

    #[test]
    fn test_join_and_leaf() {
        assert_eq!(join_path("", "Run"), "Run");
        assert_eq!(join_path("SOFTWARE", "Microsoft\\Windows"), "SOFTWARE\\Microsoft\\Windows");
        assert_eq!(join_path("SOFTWARE", "\\Vendor\\"), "SOFTWARE\\Vendor");
        assert_eq!(join_path("SOFTWARE", ""), "SOFTWARE");
        assert_eq!(leaf_name("SOFTWARE\\Microsoft"), "Microsoft");
        assert_eq!(leaf_name("SOFTWARE"), "SOFTWARE");
        assert_eq!(leaf_name(""), "");
    }
}
