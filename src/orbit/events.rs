use hifitime::Epoch;

use crate::error::{Result, VisibilityError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Rise = 0,
    Peak = 1,
    Set = 2,
}

impl TryFrom<u8> for EventKind {
    type Error = VisibilityError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(EventKind::Rise),
            1 => Ok(EventKind::Peak),
            2 => Ok(EventKind::Set),
            other => Err(VisibilityError::invalid(format!("unknown pass event code {other}"))),
        }
    }
}

/// One rise/peak/set cycle as reported by the propagator. Any slot may be
/// missing when the cycle was cut by the query window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PassEvent {
    pub rise: Option<Epoch>,
    pub peak: Option<Epoch>,
    pub set: Option<Epoch>,
}

impl PassEvent {
    pub fn is_complete(&self) -> bool {
        self.complete().is_some()
    }

    pub fn complete(&self) -> Option<PassWindow> {
        PassWindow::new(self.rise?, self.peak?, self.set?)
    }
}

/// A complete pass, `rise <= peak <= set`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassWindow {
    rise: Epoch,
    peak: Epoch,
    set: Epoch,
}

impl PassWindow {
    pub fn new(rise: Epoch, peak: Epoch, set: Epoch) -> Option<Self> {
        (rise <= peak && peak <= set).then_some(Self { rise, peak, set })
    }

    pub fn rise(&self) -> Epoch {
        self.rise
    }

    pub fn peak(&self) -> Epoch {
        self.peak
    }

    pub fn set(&self) -> Epoch {
        self.set
    }

    /// `count` instants evenly spaced in Terrestrial Time over [rise, set],
    /// both ends included.
    pub fn sample_instants(&self, count: usize) -> Vec<Epoch> {
        linspace_tt(self.rise, self.set, count)
    }
}

pub(crate) fn linspace_tt(start: Epoch, end: Epoch, count: usize) -> Vec<Epoch> {
    let t0 = start.to_tt_seconds();
    let span = end.to_tt_seconds() - t0;
    match count {
        0 => Vec::new(),
        1 => vec![start],
        n => (0..n)
            .map(|i| match i {
                0 => start,
                i if i == n - 1 => end,
                _ => Epoch::from_tt_seconds(t0 + span * i as f64 / (n - 1) as f64),
            })
            .collect(),
    }
}

/// Fold a flat `(instant, code)` stream into rise/peak/set cycles.
///
/// A rise opens a cycle, a set closes it. A cycle still open when the next
/// rise arrives, or when the stream ends, is emitted incomplete rather than
/// patched up. Output keeps stream order.
pub fn extract_passes(events: &[(Epoch, u8)]) -> Result<Vec<PassEvent>> {
    let mut passes = Vec::new();
    let mut current: Option<PassEvent> = None;

    for &(at, code) in events {
        match EventKind::try_from(code)? {
            EventKind::Rise => {
                if let Some(open) = current.take() {
                    passes.push(open);
                }
                current = Some(PassEvent { rise: Some(at), ..Default::default() });
            }
            EventKind::Peak => {
                let acc = current.get_or_insert_with(PassEvent::default);
                acc.peak.get_or_insert(at);
            }
            EventKind::Set => {
                let mut acc = current.take().unwrap_or_default();
                acc.set = Some(at);
                passes.push(acc);
            }
        }
    }

    if let Some(open) = current {
        passes.push(open);
    }

    Ok(passes)
}
