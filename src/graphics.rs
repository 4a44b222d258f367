use beacon_core::OperatingMode;
use macroquad::prelude::*;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::blackboard::{Blackboard, snapshot};
use crate::config::PollerSettings;

// Function to configure the macroquad window
pub fn window_conf() -> Conf {
    Conf {
        window_title: "Distance Beacon".to_string(),
        window_width: 800,
        window_height: 600,
        high_dpi: true,
        ..Default::default()
    }
}

const MARGIN_LEFT: f32 = 60.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 70.0;
const MARGIN_BOTTOM: f32 = 40.0;
const GRID_STEP_CM: f64 = 10.0;
/// Readings older than this are shown as stale
const STALE_AFTER: Duration = Duration::from_secs(1);

/// Draws the distance history until the window is closed or Escape is
/// pressed, then signals `shutdown`.
pub async fn run_visualization_loop(bb: Blackboard, settings: &PollerSettings, shutdown: watch::Sender<bool>) {
    info!("Visualization loop starting...");
    prevent_quit();

    let y_max = settings.out_of_range_cm;
    let points = settings.history.max(2);

    loop {
        if is_quit_requested() || is_key_pressed(KeyCode::Escape) {
            info!("Window closed, stopping poller.");
            let _ = shutdown.send(true);
            break;
        }

        let state = snapshot(&bb);

        clear_background(LIGHTGRAY);
        let left = MARGIN_LEFT;
        let top = MARGIN_TOP;
        let width = screen_width() - MARGIN_LEFT - MARGIN_RIGHT;
        let height = screen_height() - MARGIN_TOP - MARGIN_BOTTOM;
        let to_y = |cm: f64| top + height - (cm.clamp(0.0, y_max) / y_max) as f32 * height;

        // Grid and axis labels
        let mut cm = 0.0;
        while cm <= y_max {
            let y = to_y(cm);
            draw_line(left, y, left + width, y, 1.0, GRAY);
            draw_text(&format!("{cm:.0}"), left - 35.0, y + 5.0, 18.0, BLACK);
            cm += GRID_STEP_CM;
        }
        draw_rectangle_lines(left, top, width, height, 2.0, BLACK);
        draw_text("distance (cm)", 10.0, top - 10.0, 18.0, BLACK);
        draw_text("time", left + width / 2.0, top + height + 25.0, 18.0, BLACK);

        // Newest point at the right edge
        let step = width / (points - 1) as f32;
        let offset = points.saturating_sub(state.history.len());
        let mut prev: Option<Vec2> = None;
        for (i, reading) in state.history.iter().enumerate() {
            let p = vec2(left + (offset + i) as f32 * step, to_y(reading.distance_cm));
            if let Some(q) = prev {
                draw_line(q.x, q.y, p.x, p.y, 2.0, DARKBLUE);
            }
            if reading.out_of_range {
                draw_circle(p.x, p.y, 3.0, RED);
            }
            prev = Some(p);
        }

        let mut distance_label = match state.latest() {
            Some(r) if r.out_of_range => "OUT OF RANGE".to_string(),
            Some(r) => format!("{:.2}", r.distance_cm),
            None => "--".to_string(),
        };
        if state.latest().is_some() && state.last_poll_ts.elapsed() > STALE_AFTER {
            distance_label.push_str(" (stale)");
        }
        let mode_label = match state.mode {
            Some(byte) => match OperatingMode::try_from(byte) {
                Ok(mode) => mode.to_string(),
                Err(_) => format!("unknown ({byte:#04x})"),
            },
            None => "not set".to_string(),
        };
        draw_text(&format!("Distance (cm): {distance_label}"), 10.0, 24.0, 24.0, BLACK);
        draw_text(&format!("Mode: {mode_label}"), 10.0, 46.0, 20.0, BLACK);
        if let Some(fault) = state.faults.last() {
            draw_text(&format!("Fault: {fault}"), 300.0, 46.0, 20.0, RED);
        }

        next_frame().await
    }
}
