// src/display/terminal.rs
//! Terminal table of the last known position of every device

use crate::{
    error::Result,
    protocol::{position::keys, Position},
    session::{DeviceRegistry, LastPositionStore},
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Redraw once a second until `running` is cleared
    pub async fn run(
        &self,
        store: Arc<LastPositionStore>,
        registry: Arc<DeviceRegistry>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Hide, DisableLineWrap)?;

        while running.load(Ordering::Relaxed) {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

            let positions = store.snapshot();
            self.render_display(&mut stdout, &positions, &registry)?;

            stdout.flush()?;
            sleep(Duration::from_secs(1)).await;
        }

        execute!(stdout, Show, EnableLineWrap)?;
        Ok(())
    }

    fn render_display(
        &self,
        stdout: &mut impl Write,
        positions: &[Position],
        registry: &DeviceRegistry,
    ) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(96)),
            Print("\n"),
            Print(format!(
                "GL200 Decoder - {} device(s) known, {} with a fix\n",
                registry.device_count(),
                positions.len()
            )),
            Print("=".repeat(96)),
            Print("\n"),
            ResetColor
        )?;

        execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "{:<16} {:<20} {:>12} {:>12} {:>8} {:>7} {:>6}\n",
                "DEVICE", "FIX TIME", "LATITUDE", "LONGITUDE", "ALT", "KNOTS", "BATT"
            )),
            ResetColor
        )?;

        if positions.is_empty() {
            execute!(stdout, Print("  No fixes received yet\n"))?;
        }

        for position in positions {
            let unique_id = registry
                .unique_id(position.device_id)
                .unwrap_or_else(|| position.device_id.to_string());
            execute!(stdout, Print(format_row(&unique_id, position)))?;
        }

        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(96)),
            Print("\n"),
            Print("Press Ctrl+C to exit"),
            Print("\n"),
            ResetColor
        )?;

        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

fn format_row(unique_id: &str, position: &Position) -> String {
    let battery = position
        .get(keys::BATTERY)
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<16} {:<20} {} {} {:>8.1} {:>7.1} {:>6}\n",
        unique_id,
        position.fix_time.format("%Y-%m-%d %H:%M:%S"),
        Position::format_coordinate(position.latitude),
        Position::format_coordinate(position.longitude),
        position.altitude,
        position.speed,
        battery
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{reconcile, DeviceId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_row() {
        let mut position = Position::new("gl200", DeviceId(1));
        let time = Utc.with_ymd_and_hms(2009, 2, 14, 1, 32, 54).unwrap();
        reconcile::apply_fix(&mut position, 121.354335, 31.222073, time);
        position.altitude = 70.0;
        position.set(keys::BATTERY, Some(80_i64));

        let row = format_row("862193020451183", &position);
        assert!(row.starts_with("862193020451183  2009-02-14 01:32:54"));
        assert!(row.contains(" 31.222073°"));
        assert!(row.contains("121.354335°"));
        assert!(row.trim_end().ends_with("80"));
    }

    #[test]
    fn test_render_empty_table() {
        let registry = DeviceRegistry::new(true);
        let mut output = Vec::new();
        TerminalDisplay::new()
            .render_display(&mut output, &[], &registry)
            .unwrap();

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("0 device(s) known"));
        assert!(text.contains("No fixes received yet"));
    }
}
