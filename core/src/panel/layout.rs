//! Height budgets and resize requests toward the hosting shell.

use crate::config::Config;
use crate::host::LayoutMetrics;
use crate::host::ResizeRequest;

/// The kinds of height change the panel makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightTransition {
    Open,
    Toggle,
    Enlarge,
    Collapse,
    Close,
}

/// Resource-backed content animates; revealing or hiding already rendered
/// text applies at once. Enlarge and collapse always animate.
pub fn animates(transition: HeightTransition, resource_backed: bool) -> bool {
    match transition {
        HeightTransition::Enlarge | HeightTransition::Collapse => true,
        HeightTransition::Close => false,
        HeightTransition::Open | HeightTransition::Toggle => resource_backed,
    }
}

/// Base panel height: a fraction of the screen, capped by the configured
/// maximum and by what the shell supports.
pub fn base_panel_height(metrics: &LayoutMetrics, config: &Config) -> f64 {
    (metrics.screen_height_px * config.panel_height_fraction)
        .min(config.max_panel_height_px)
        .min(metrics.max_total_height_px)
        .max(0.0)
}

/// Total heights for a given panel height, with and without the key-input
/// surface below it. Both are clamped to the shell's advertised maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightBudget {
    pub panel_only: f64,
    pub panel_with_keyboard: f64,
}

impl HeightBudget {
    pub fn for_panel(panel_height_px: f64, metrics: &LayoutMetrics) -> Self {
        let max = metrics.max_total_height_px;
        Self {
            panel_only: panel_height_px.min(max),
            panel_with_keyboard: (panel_height_px + metrics.keyboard_height_px).min(max),
        }
    }
}

/// Issues resize requests. Each request supersedes the previous one; a
/// request for the height already asserted is dropped.
#[derive(Debug, Default)]
pub struct ResizeCoordinator {
    generation: u64,
    asserted_px: Option<f64>,
}

impl ResizeCoordinator {
    pub fn request(
        &mut self,
        total_height_px: f64,
        metrics: &LayoutMetrics,
        animated: bool,
    ) -> Option<ResizeRequest> {
        let clamped = total_height_px.min(metrics.max_total_height_px).max(0.0);
        if self.asserted_px == Some(clamped) {
            return None;
        }
        self.generation += 1;
        self.asserted_px = Some(clamped);
        Some(ResizeRequest {
            generation: self.generation,
            total_height_px: clamped,
            animated,
        })
    }

    /// Hands the extension back its plain keyboard height, if the panel ever
    /// asserted something else.
    pub fn restore(&mut self, metrics: &LayoutMetrics) -> Option<ResizeRequest> {
        self.asserted_px?;
        let request = self.request(metrics.keyboard_height_px, metrics, false);
        self.asserted_px = None;
        request
    }

    pub fn asserted_px(&self) -> Option<f64> {
        self.asserted_px
    }
}
