use std::fmt;
use std::str::FromStr;

/// The part a process plays in a multi-process application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessRole {
    /// The coordinating process that hosts the hub.
    Main = 0,
    /// A satellite process (worker, renderer) attached to the hub.
    Sub = 1,
}

impl ProcessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessRole::Main => "main",
            ProcessRole::Sub => "sub",
        }
    }

    /// The role on the other side of a main/sub conversation.
    pub fn opposite(self) -> Self {
        match self {
            ProcessRole::Main => ProcessRole::Sub,
            ProcessRole::Sub => ProcessRole::Main,
        }
    }
}

impl TryFrom<u8> for ProcessRole {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProcessRole::Main),
            1 => Ok(ProcessRole::Sub),
            other => Err(other),
        }
    }
}

impl From<ProcessRole> for u8 {
    fn from(role: ProcessRole) -> Self {
        role as u8
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(ProcessRole::Main),
            "sub" => Ok(ProcessRole::Sub),
            other => Err(format!("unknown process role '{other}' (expected main or sub)")),
        }
    }
}

/// Which processes a listener wants to hear from.
///
/// A listener registered with a scope only fires in processes whose role
/// the scope admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListenerScope {
    #[default]
    Main,
    Sub,
    All,
}

impl ListenerScope {
    pub fn admits(self, role: ProcessRole) -> bool {
        match self {
            ListenerScope::Main => role == ProcessRole::Main,
            ListenerScope::Sub => role == ProcessRole::Sub,
            ListenerScope::All => true,
        }
    }
}
