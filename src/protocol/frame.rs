// src/protocol/frame.rs
//! Frame classification by the message type code

const TYPE_MARKER: &str = ":GT";

/// The frame families the decoder knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'s> {
    Heartbeat,
    Info,
    Diagnostics,
    /// Location reports, alarms and every other code sharing the common layout
    Generic(&'s str),
}

impl<'s> FrameKind<'s> {
    /// Route a sentence by the three letters following `:GT`.
    ///
    /// Returns `None` when there is no marker or the code is cut short.
    pub fn classify(sentence: &'s str) -> Option<Self> {
        let start = sentence.find(TYPE_MARKER)? + TYPE_MARKER.len();
        let code = sentence.get(start..start + 3)?;
        Some(match code {
            "HBD" => FrameKind::Heartbeat,
            "INF" => FrameKind::Info,
            "OBD" => FrameKind::Diagnostics,
            other => FrameKind::Generic(other),
        })
    }

    pub fn code(&self) -> &'s str {
        match self {
            FrameKind::Heartbeat => "HBD",
            FrameKind::Info => "INF",
            FrameKind::Diagnostics => "OBD",
            FrameKind::Generic(code) => code,
        }
    }
}
