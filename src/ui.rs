// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terminal dashboard.
//!
//! Rendering is a pure function of a [`Dashboard`] model, which the run loop
//! updates from [`BridgeEvent`]s. Keys map to [`UiAction`]s that the run loop
//! hands to the control surface.

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};

use crate::bridge::{BridgePhase, BridgeStats};
use crate::event::BridgeEvent;
use crate::state::DeviceStateView;

/// Readings older than this are shown as stale.
const STALE_AFTER_SECS: i64 = 300;

/// A user action decoded from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    /// Switch the LED on or off.
    SetLed(bool),
    /// Invert the LED.
    ToggleLed,
    /// Leave the dashboard.
    Quit,
}

/// Maps a key press to an action.
///
/// `l` toggles, `1` switches on, `0` switches off, `q`, `Esc` and `Ctrl-C`
/// quit. Key releases and repeats are ignored.
#[must_use]
pub fn map_key(key: KeyEvent) -> Option<UiAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(UiAction::Quit)
        }
        KeyCode::Char('l' | 'L') => Some(UiAction::ToggleLed),
        KeyCode::Char('1') => Some(UiAction::SetLed(true)),
        KeyCode::Char('0') => Some(UiAction::SetLed(false)),
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => Some(UiAction::Quit),
        _ => None,
    }
}

/// Everything the dashboard shows.
#[derive(Debug, Clone)]
pub struct Dashboard {
    device_id: String,
    view: DeviceStateView,
    phase: BridgePhase,
    stats: BridgeStats,
    last_raw: Option<(String, String)>,
    last_error: Option<String>,
}

impl Dashboard {
    /// Creates an empty dashboard for `device_id`.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            view: DeviceStateView::default(),
            phase: BridgePhase::Disconnected,
            stats: BridgeStats::default(),
            last_raw: None,
            last_error: None,
        }
    }

    /// Returns the device state being shown.
    #[must_use]
    pub fn view(&self) -> &DeviceStateView {
        &self.view
    }

    /// Refreshes the bridge status shown in the footer.
    pub fn set_status(&mut self, phase: BridgePhase, stats: BridgeStats) {
        self.phase = phase;
        self.stats = stats;
    }

    /// Updates the model from a bridge event.
    pub fn apply(&mut self, event: &BridgeEvent) {
        match event {
            BridgeEvent::StateChanged(view) => self.view = *view,
            BridgeEvent::Raw { topic, payload } => {
                self.last_raw = Some((topic.clone(), payload.clone()));
            }
            BridgeEvent::DecodeFailed { error, .. } => self.record_error(error),
            BridgeEvent::PublishFailed { topic, error } => {
                self.record_error(&format!("downlink to {topic} failed: {error}"));
            }
            BridgeEvent::Connected { .. } | BridgeEvent::Resumed { .. } => {
                self.phase = BridgePhase::Consuming;
            }
            BridgeEvent::LinkLost => self.phase = BridgePhase::ReconnectPending,
            BridgeEvent::Closed => self.phase = BridgePhase::Closed,
        }
    }

    fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }
}

fn temperature_line(view: &DeviceStateView, now: DateTime<Utc>) -> Line<'static> {
    let Some(value) = view.last_temperature else {
        return Line::from(vec![
            Span::raw("Temperature  "),
            Span::styled("waiting for first reading", Style::new().fg(Color::DarkGray)),
        ]);
    };

    let age = view
        .temperature_age(now)
        .map_or_else(String::new, |age| format!("  ({}s ago)", age.num_seconds().max(0)));
    let stale = view.is_temperature_stale(now, chrono::Duration::seconds(STALE_AFTER_SECS));
    let style = if stale {
        Style::new().fg(Color::DarkGray)
    } else {
        Style::new().add_modifier(Modifier::BOLD)
    };

    Line::from(vec![
        Span::raw("Temperature  "),
        Span::styled(format!("{value:.1} °C"), style),
        Span::raw(age),
    ])
}

fn led_line(view: &DeviceStateView) -> Line<'static> {
    let (label, style) = if view.led_on {
        ("ON", Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    } else {
        ("off", Style::new().fg(Color::DarkGray))
    };
    Line::from(vec![Span::raw("LED          "), Span::styled(label, style)])
}

fn link_line(phase: BridgePhase) -> Line<'static> {
    let color = match phase {
        BridgePhase::Consuming => Color::Green,
        BridgePhase::ReconnectPending | BridgePhase::Connecting => Color::Yellow,
        _ => Color::Red,
    };
    Line::from(vec![
        Span::raw("Link         "),
        Span::styled(phase.as_str(), Style::new().fg(color)),
    ])
}

fn stats_line(stats: &BridgeStats) -> Line<'static> {
    Line::from(format!(
        "rx {}  applied {}  ignored {}  bad {}  raw {}  drops {}",
        stats.received,
        stats.applied,
        stats.ignored,
        stats.decode_errors,
        stats.raw,
        stats.link_losses
    ))
}

/// Renders the dashboard into `frame`.
pub fn draw(frame: &mut Frame, dashboard: &Dashboard, now: DateTime<Utc>) {
    let [device_area, status_area, help_area] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let device = Paragraph::new(vec![
        temperature_line(&dashboard.view, now),
        led_line(&dashboard.view),
        link_line(dashboard.phase),
    ])
    .block(Block::bordered().title(format!(" {} ", dashboard.device_id)));
    frame.render_widget(device, device_area);

    let mut status = vec![stats_line(&dashboard.stats)];
    if let Some((topic, payload)) = &dashboard.last_raw {
        status.push(Line::from(format!("{topic}: {payload}")));
    }
    if let Some(error) = &dashboard.last_error {
        status.push(Line::styled(
            format!("last error: {error}"),
            Style::new().fg(Color::Red),
        ));
    }
    frame.render_widget(
        Paragraph::new(status).block(Block::bordered().title(" bridge ")),
        status_area,
    );

    frame.render_widget(
        Paragraph::new("[l] toggle LED  [1] on  [0] off  [q] quit")
            .style(Style::new().fg(Color::DarkGray)),
        help_area,
    );
}
