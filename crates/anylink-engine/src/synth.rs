//! Overlay synthesis: give any object a hyperlink by covering it with an
//! invisible, hyperlinked text node and grouping the two.
//!
//! `synthesize` runs a fixed list of [`SynthStep`]s. Each step either
//! succeeds, retries (text and font writes that hit "font not ready"), or
//! fails the whole synthesis. Once the overlay exists, any failure removes
//! it again before the error propagates, so a failed command never leaves
//! an orphan overlay behind.

use crate::host::{Host, HostError, NodeInfo};
use anylink_core::{FontName, LinkConfig, LinkError, NodeId};
use log::{debug, warn};

// ─── Steps ───────────────────────────────────────────────────────────────

/// Ordered steps of one synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthStep {
    ValidateGeometry,
    AcquireFont,
    CreateOverlay,
    Measure,
    Fill,
    Pin,
    Link,
    Group,
    Commit,
}

/// Result of a successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub overlay: NodeId,
    /// `None` when the host refused to group the object.
    pub group: Option<NodeId>,
    /// The full fill was rejected and a single-line run was written instead.
    pub degraded: bool,
    pub steps: Vec<SynthStep>,
}

/// What `teardown` managed to do. Teardown never fails: whatever is already
/// gone counts as removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub overlay_removed: bool,
    pub ungrouped: bool,
}

// ─── Coverage ────────────────────────────────────────────────────────────

/// Filler grid written into the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub chars_per_line: usize,
    pub lines: usize,
}

impl Coverage {
    pub fn total(&self) -> usize {
        self.chars_per_line * self.lines
    }

    pub fn text(&self, filler: char) -> String {
        let line: String = std::iter::repeat_n(filler, self.chars_per_line).collect();
        vec![line; self.lines].join("\n")
    }
}

/// How many filler glyphs of `glyph_width` x `line_height` cover a
/// `width` x `height` object.
///
/// Width gets padded (`width_padding` plus `width_margin` characters) so
/// rounding never leaves an uncovered strip on the right. Height only gets
/// `height_coverage` of the nominal line count, which keeps the text from
/// spilling below the object. Both axes are capped, and scaled down together
/// when their product exceeds `max_total_chars`.
pub fn plan_coverage(config: &LinkConfig, width: f32, height: f32, glyph_width: f32, line_height: f32) -> Coverage {
    let glyph_width = glyph_width.max(f32::EPSILON);
    let line_height = line_height.max(f32::EPSILON);

    let max_cols = config.max_chars_per_line.max(1);
    let max_rows = config.max_lines.max(1);

    // Capped in f64 before the cast; huge finite sizes must not saturate.
    let nominal_cols = f64::from((width / glyph_width).ceil());
    let padded_cols = (nominal_cols * (1.0 + f64::from(config.width_padding)))
        .ceil()
        .min(max_cols as f64);
    let cols = (padded_cols as usize).saturating_add(config.width_margin);
    let nominal_rows = f64::from((height / line_height).ceil());
    let rows = (nominal_rows * f64::from(config.height_coverage)).ceil().min(max_rows as f64) as usize;

    let mut cols = cols.clamp(1, max_cols);
    let mut rows = rows.clamp(1, max_rows);

    let area = cols.saturating_mul(rows);
    if area > config.max_total_chars {
        let scale = (config.max_total_chars as f64 / area as f64).sqrt();
        cols = ((cols as f64 * scale).floor() as usize).max(1);
        rows = ((rows as f64 * scale).floor() as usize).max(1);
    }

    Coverage {
        chars_per_line: cols,
        lines: rows,
    }
}

// ─── Font-tolerant writes ────────────────────────────────────────────────

/// Run a text or font write, loading whatever font the host reports as not
/// ready and retrying, up to `attempts` times.
async fn write_with_retry<H, F>(host: &mut H, attempts: usize, mut op: F) -> Result<(), LinkError>
where
    H: Host + ?Sized,
    F: FnMut(&mut H) -> Result<(), HostError>,
{
    let mut pending: Option<FontName> = None;
    for attempt in 1..=attempts.max(1) {
        match op(host) {
            Ok(()) => return Ok(()),
            Err(HostError::FontNotReady(font)) => {
                debug!("font {} {} not ready (attempt {attempt})", font.family, font.style);
                if let Err(e) = host.load_font(&font).await {
                    debug!("loading {} {} failed: {e}", font.family, font.style);
                }
                pending = Some(font);
            }
            Err(e) => return Err(e.into()),
        }
    }
    let font = pending.unwrap_or_else(|| FontName::new("", ""));
    Err(LinkError::font_binding(&font, attempts))
}

// ─── Synthesizer ─────────────────────────────────────────────────────────

/// Creates, relinks and removes overlays.
pub struct OverlaySynthesizer<'a> {
    config: &'a LinkConfig,
}

impl<'a> OverlaySynthesizer<'a> {
    pub fn new(config: &'a LinkConfig) -> Self {
        Self { config }
    }

    /// Cover `object` with a hyperlinked overlay and group the two.
    /// The whole construction is one undo step.
    pub async fn synthesize<H: Host + ?Sized>(&self, host: &mut H, object: &NodeInfo, url: &str) -> Result<Synthesized, LinkError> {
        let mut steps = vec![SynthStep::ValidateGeometry];
        if !object.bounds.has_area() {
            return Err(LinkError::InvalidGeometry {
                width: object.bounds.width,
                height: object.bounds.height,
            });
        }
        let parent = object.parent.ok_or(LinkError::NodeNotFound(object.id))?;

        steps.push(SynthStep::AcquireFont);
        let font = self.acquire_font(host).await?;

        steps.push(SynthStep::CreateOverlay);
        let overlay = host.create_text()?;
        debug!("created overlay {overlay} for {}", object.id);

        match self.build(host, object, parent, overlay, &font, url, &mut steps).await {
            Ok((group, degraded)) => {
                steps.push(SynthStep::Commit);
                host.commit_undo();
                Ok(Synthesized {
                    overlay,
                    group,
                    degraded,
                    steps,
                })
            }
            Err(e) => {
                warn!("synthesis for {} failed at {:?}: {e}", object.id, steps.last());
                if let Err(cleanup) = host.remove(overlay) {
                    debug!("overlay {overlay} cleanup: {cleanup}");
                }
                Err(e)
            }
        }
    }

    async fn acquire_font<H: Host + ?Sized>(&self, host: &mut H) -> Result<FontName, LinkError> {
        for font in &self.config.font_preferences {
            match host.load_font(font).await {
                Ok(()) => return Ok(font.clone()),
                Err(e) => debug!("font {} {} unavailable: {e}", font.family, font.style),
            }
        }
        Err(LinkError::NoFontAvailable)
    }

    /// Steps after the overlay exists. Returns the group (if any) and
    /// whether coverage had to be degraded.
    #[allow(clippy::too_many_arguments)]
    async fn build<H: Host + ?Sized>(
        &self,
        host: &mut H,
        object: &NodeInfo,
        parent: NodeId,
        overlay: NodeId,
        font: &FontName,
        url: &str,
        steps: &mut Vec<SynthStep>,
    ) -> Result<(Option<NodeId>, bool), LinkError> {
        let cfg = self.config;
        let attempts = cfg.font_retry_attempts;
        let filler = cfg.filler.to_string();

        host.set_opacity(overlay, 0.0)?;
        write_with_retry(host, attempts, |h| h.set_characters(overlay, &filler)).await?;
        write_with_retry(host, attempts, |h| h.set_font_size(overlay, cfg.sentinel_font_size)).await?;
        write_with_retry(host, attempts, |h| h.set_font(overlay, font)).await?;

        steps.push(SynthStep::Measure);
        let object_index = sibling_index(host, parent, object.id);
        host.insert_child(parent, object_index + 1, overlay)?;
        let glyph = host.node(overlay).ok_or(LinkError::NodeNotFound(overlay))?.bounds;
        let (glyph_w, line_h) = if glyph.has_area() {
            (glyph.width, glyph.height)
        } else {
            (cfg.sentinel_font_size * 0.6, cfg.sentinel_font_size * 1.2)
        };

        steps.push(SynthStep::Fill);
        let coverage = plan_coverage(cfg, object.bounds.width, object.bounds.height, glyph_w, line_h);
        debug!(
            "overlay {overlay}: {} x {} filler grid",
            coverage.chars_per_line, coverage.lines
        );
        let full = coverage.text(cfg.filler);
        let degraded = match write_with_retry(host, attempts, |h| h.set_characters(overlay, &full)).await {
            Ok(()) => false,
            Err(e) => {
                warn!("full fill for {overlay} rejected ({e}), writing a single line");
                let run: String = std::iter::repeat_n(cfg.filler, coverage.total().min(cfg.fallback_chars)).collect();
                write_with_retry(host, attempts, |h| h.set_characters(overlay, &run)).await?;
                host.notify("Link area may not cover the whole object.", false);
                true
            }
        };

        steps.push(SynthStep::Pin);
        let b = object.bounds;
        host.resize(overlay, b.width, b.height)?;
        host.move_to(overlay, b.x, b.y)?;

        steps.push(SynthStep::Link);
        let len = host
            .node(overlay)
            .and_then(|n| n.text().map(|t| t.len))
            .ok_or(LinkError::NodeNotFound(overlay))?;
        host.set_hyperlink(overlay, 0, len, Some(url))?;

        steps.push(SynthStep::Group);
        let group = match host.group(&[object.id, overlay], parent, object_index) {
            Ok(group) => {
                host.set_name(group, &cfg.group_name(&object.name))?;
                Some(group)
            }
            Err(e) => {
                warn!("could not group {} with its overlay: {e}", object.id);
                None
            }
        };

        Ok((group, degraded))
    }

    /// Point an existing overlay at a new URL. One undo step.
    pub fn resynthesize_url<H: Host + ?Sized>(&self, host: &mut H, overlay: NodeId, url: &str) -> Result<(), LinkError> {
        let len = host
            .node(overlay)
            .and_then(|n| n.text().map(|t| t.len))
            .ok_or(LinkError::NodeNotFound(overlay))?;
        host.set_hyperlink(overlay, 0, len, Some(url))?;
        host.commit_undo();
        Ok(())
    }

    /// Remove the overlay and dissolve its group, putting the remaining
    /// child where the group was.
    pub fn teardown<H: Host + ?Sized>(&self, host: &mut H, group: Option<NodeId>, overlay: Option<NodeId>) -> TeardownOutcome {
        let mut outcome = TeardownOutcome::default();

        if let Some(overlay) = overlay {
            outcome.overlay_removed = remove_tolerant(host, overlay);
        }

        if let Some(group) = group
            && let Some(info) = host.node(group)
            && info.is_container()
        {
            match info.parent {
                Some(parent) => {
                    let mut index = sibling_index(host, parent, group);
                    for child in info.children().iter().copied().filter(|&c| Some(c) != overlay) {
                        match host.insert_child(parent, index, child) {
                            Ok(()) => index += 1,
                            Err(e) => warn!("could not move {child} out of {group}: {e}"),
                        }
                    }
                    remove_tolerant(host, group);
                    outcome.ungrouped = true;
                }
                None => warn!("group {group} has no parent, leaving it in place"),
            }
        }

        if outcome.overlay_removed || outcome.ungrouped {
            host.commit_undo();
        }
        outcome
    }
}

/// Remove a node, treating "already gone" as success.
fn remove_tolerant<H: Host + ?Sized>(host: &mut H, id: NodeId) -> bool {
    match host.remove(id) {
        Ok(()) => true,
        Err(HostError::NodeNotFound(_)) => {
            debug!("{id} already removed");
            true
        }
        Err(e) => {
            warn!("could not remove {id}: {e}");
            false
        }
    }
}

/// Index of `child` among `parent`'s children (0 if not found).
fn sibling_index<H: Host + ?Sized>(host: &H, parent: NodeId, child: NodeId) -> usize {
    host.children(parent)
        .iter()
        .position(|&c| c == child)
        .unwrap_or(0)
}
