// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Single source of truth for built-in tool identifiers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinToolId {
    SaveFile,
    ListFiles,
    CreateProject,
}

impl BuiltinToolId {
    pub const ALL: &'static [Self] = &[Self::SaveFile, Self::ListFiles, Self::CreateProject];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaveFile => "save-file",
            Self::ListFiles => "list-files",
            Self::CreateProject => "create-project",
        }
    }
}

impl TryFrom<&str> for BuiltinToolId {
    type Error = ();
    fn try_from(s: &str) -> Result<Self, ()> {
        match s {
            "save-file" => Ok(Self::SaveFile),
            "list-files" => Ok(Self::ListFiles),
            "create-project" => Ok(Self::CreateProject),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for BuiltinToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_id_parses_back() {
        for id in BuiltinToolId::ALL {
            assert_eq!(BuiltinToolId::try_from(id.as_str()), Ok(*id));
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(BuiltinToolId::try_from("save_file").is_err());
        assert!(BuiltinToolId::try_from("").is_err());
    }
}
