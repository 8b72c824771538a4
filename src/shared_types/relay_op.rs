// -----------------------------------------------------------------------------
// ----- RelayOp ---------------------------------------------------------------

/// The four calls a frame relay endpoint answers. Used to tag errors and log
/// lines on both sides of the HTTP hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOp {
    Create,
    Read,
    Write,
    Close,
}

impl RelayOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayOp::Create => "create",
            RelayOp::Read => "read",
            RelayOp::Write => "write",
            RelayOp::Close => "close",
        }
    }

    /// Request path on the relay.
    pub fn route(self) -> &'static str {
        match self {
            RelayOp::Create => "/new",
            RelayOp::Read => "/r",
            RelayOp::Write => "/w",
            RelayOp::Close => "/close",
        }
    }
}

impl std::fmt::Display for RelayOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
