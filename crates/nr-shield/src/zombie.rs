//! Inert stand-in returned for suppressed popups.
//!
//! Page script reads members off a zombie the way it would off a real
//! window. Every read resolves through [`ZombieWindow::member`]: writes are
//! absorbed by the realm, data reads return fixed sentinels and methods do
//! nothing.

/// Object a member is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZombieScope {
    Window,
    Location,
    Document,
}

impl ZombieScope {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "window" => Some(Self::Window),
            "location" => Some(Self::Location),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

/// What reading one member yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZombieMember {
    /// `closed` reads `false` so polling scripts do not retry.
    NotClosed,
    /// The nested `location` object.
    Location,
    /// The nested `document` object.
    Document,
    /// `about:blank`.
    BlankUrl,
    /// A method returning `about:blank`.
    BlankUrlMethod,
    /// `undefined`. Keeps thenable checks from treating the zombie as a promise.
    Absent,
    /// A callable that does nothing.
    NoOp,
}

impl ZombieMember {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotClosed => "not_closed",
            Self::Location => "location",
            Self::Document => "document",
            Self::BlankUrl => "blank_url",
            Self::BlankUrlMethod => "blank_url_method",
            Self::Absent => "absent",
            Self::NoOp => "noop",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ZombieWindow;

impl ZombieWindow {
    pub const LOCATION: &'static str = "about:blank";

    pub fn member(scope: ZombieScope, property: &str) -> ZombieMember {
        if property == "then" {
            return ZombieMember::Absent;
        }

        match (scope, property) {
            (ZombieScope::Window, "closed") => ZombieMember::NotClosed,
            (ZombieScope::Window, "location") => ZombieMember::Location,
            (ZombieScope::Window, "document") => ZombieMember::Document,
            (ZombieScope::Window | ZombieScope::Document, "opener") => ZombieMember::Absent,
            (ZombieScope::Location, "assign" | "replace" | "reload") => ZombieMember::NoOp,
            (ZombieScope::Location, "toString" | "valueOf") => ZombieMember::BlankUrlMethod,
            (ZombieScope::Location, _) => ZombieMember::BlankUrl,
            (ZombieScope::Document, "URL") => ZombieMember::BlankUrl,
            _ => ZombieMember::NoOp,
        }
    }
}
