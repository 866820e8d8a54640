//! Glue between the synchronizer and whatever displays it.
//!
//! A [`PresentationSurface`] only renders. [`PresentationBridge`] turns
//! user actions into controller calls and pushes every resulting
//! [`ViewUpdate`] back to the surface, including the ones the worker
//! schedules after a batch.

#![allow(missing_docs)]

use std::time::Duration;

use crate::core::errors::{Result, SyncError};
use crate::store::{ConversionReport, RecordView};
use crate::sync::{SyncController, ViewUpdate};

/// Rendering side of the bridge.
pub trait PresentationSurface {
    /// Records not in `selected`, in display order.
    fn show_unconverted(&mut self, selected: &str, records: &[RecordView]);

    fn show_automatic_conversion(&mut self, enabled: bool);

    fn report_conversion(&mut self, report: &ConversionReport);

    /// An action failed. The default prints a tagged line to stderr.
    fn report_error(&mut self, error: &SyncError) {
        eprintln!("[CUS-UI] {error}");
    }
}

/// A user action arriving from the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    SelectRegion(String),
    Refresh,
    ConvertNow,
    SetAutomatic(bool),
    ToggleAutomatic,
    Rescan,
}

pub struct PresentationBridge<'a, S: PresentationSurface> {
    controller: &'a SyncController,
    surface: S,
}

impl<'a, S: PresentationSurface> PresentationBridge<'a, S> {
    pub const fn new(controller: &'a SyncController, surface: S) -> Self {
        Self {
            controller,
            surface,
        }
    }

    pub const fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Push the current view without changing anything.
    pub fn show_current(&mut self) {
        let update = self.controller.refresh();
        self.render(&update);
    }

    /// Run one action. Errors are shown on the surface and returned.
    pub fn dispatch(&mut self, action: UiAction) -> Result<()> {
        let outcome = match action {
            UiAction::SelectRegion(code) => self.controller.select_region(&code),
            UiAction::Refresh => Ok(self.controller.refresh()),
            UiAction::ConvertNow => self.controller.convert_now().map(|report| {
                let mut update = self.controller.refresh();
                update.conversion = Some(report);
                update
            }),
            UiAction::SetAutomatic(enabled) => self.controller.set_automatic_conversion(enabled),
            UiAction::ToggleAutomatic => self.controller.toggle_automatic_conversion(),
            UiAction::Rescan => {
                self.controller.request_rescan();
                return Ok(());
            }
        };
        self.finish(outcome)
    }

    /// Handle worker-scheduled tasks for up to `timeout`. Returns how many
    /// were handled.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let mut handled = 0;
        let mut wait = timeout;
        while let Some(outcome) = self.controller.pump_ui(wait) {
            handled += 1;
            let _ = self.finish(outcome);
            // Drain whatever else is already queued without blocking again.
            wait = Duration::ZERO;
        }
        handled
    }

    fn finish(&mut self, outcome: Result<ViewUpdate>) -> Result<()> {
        match outcome {
            Ok(update) => {
                self.render(&update);
                match update.conversion.as_ref().and_then(ConversionReport::error) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Err(err) => {
                self.surface.report_error(&err);
                Err(err)
            }
        }
    }

    fn render(&mut self, update: &ViewUpdate) {
        if let Some(report) = &update.conversion {
            self.surface.report_conversion(report);
        }
        self.surface
            .show_automatic_conversion(update.automatic_conversion);
        self.surface
            .show_unconverted(&update.selected, &update.unconverted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::activity::ActivityLoggerHandle;
    use crate::platform::file_id::NoFileIdentity;
    use crate::sync::SyncOptions;
    use std::fs;
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Default)]
    struct Recording {
        views: Vec<(String, Vec<RecordView>)>,
        automatic: Vec<bool>,
        conversions: Vec<ConversionReport>,
        errors: Vec<String>,
    }

    impl PresentationSurface for Recording {
        fn show_unconverted(&mut self, selected: &str, records: &[RecordView]) {
            self.views.push((selected.to_string(), records.to_vec()));
        }

        fn show_automatic_conversion(&mut self, enabled: bool) {
            self.automatic.push(enabled);
        }

        fn report_conversion(&mut self, report: &ConversionReport) {
            self.conversions.push(report.clone());
        }

        fn report_error(&mut self, error: &SyncError) {
            self.errors.push(error.code().to_string());
        }
    }

    fn start(root: &std::path::Path) -> SyncController {
        let mut options = SyncOptions::for_root(root);
        options.poll_interval = Duration::from_millis(20);
        options.identity = Arc::new(NoFileIdentity);
        SyncController::start(options, ActivityLoggerHandle::detached()).unwrap()
    }

    #[test]
    fn region_change_refreshes_view() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.cus"), b"HEADER..KOR-a").unwrap();
        let controller = start(dir.path());
        let mut bridge = PresentationBridge::new(&controller, Recording::default());

        bridge.show_current();
        bridge
            .dispatch(UiAction::SelectRegion("KOR".to_string()))
            .unwrap();

        let surface = bridge.into_surface();
        assert_eq!(surface.views.len(), 2);
        assert_eq!(surface.views[0].0, "USA");
        assert_eq!(surface.views[0].1.len(), 1);
        assert_eq!(surface.views[1].0, "KOR");
        assert!(surface.views[1].1.is_empty());
    }

    #[test]
    fn invalid_region_is_reported_not_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let controller = start(dir.path());
        let mut bridge = PresentationBridge::new(&controller, Recording::default());

        assert!(bridge.dispatch(UiAction::SelectRegion("X".to_string())).is_err());
        let surface = bridge.into_surface();
        assert_eq!(surface.errors, vec!["CUS-2001".to_string()]);
        assert!(surface.views.is_empty());
    }

    #[test]
    fn convert_now_reports_and_clears_view() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.cus"), b"HEADER..KOR-a").unwrap();
        fs::write(dir.path().join("b.cus"), b"HEADER..RUS-b").unwrap();
        let controller = start(dir.path());
        let mut bridge = PresentationBridge::new(&controller, Recording::default());

        bridge.dispatch(UiAction::ConvertNow).unwrap();
        let surface = bridge.into_surface();
        assert_eq!(surface.conversions.len(), 1);
        assert_eq!(surface.conversions[0].converted, 2);
        assert!(surface.views.last().unwrap().1.is_empty());
    }

    #[test]
    fn external_change_reaches_surface_through_pump() {
        let dir = tempfile::tempdir().unwrap();
        let controller = start(dir.path());
        let mut bridge = PresentationBridge::new(&controller, Recording::default());
        bridge.dispatch(UiAction::SetAutomatic(true)).unwrap();

        fs::write(dir.path().join("new.cus"), b"HEADER..KOR-new").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while bridge.surface().conversions.len() < 2 && Instant::now() < deadline {
            bridge.pump(Duration::from_millis(50));
        }

        let surface = bridge.into_surface();
        let last = surface.conversions.last().unwrap();
        assert_eq!(last.converted, 1);
        assert_eq!(&fs::read(dir.path().join("new.cus")).unwrap()[8..11], b"USA");
        assert!(surface.automatic.iter().all(|on| *on));
    }
}
