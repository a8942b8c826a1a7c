use crate::chart::{paint, ChartFrame, Gradient, Point, Rgba, Surface, TextAlign, Viewport};
use std::fmt::Write;

/// Paints chart commands into an SVG document. The element is sized to the
/// backing resolution and the `viewBox` to CSS pixels, so the drawing scales by
/// the device pixel ratio.
#[derive(Default)]
pub struct SvgSurface {
    header: String,
    defs: String,
    body: String,
    gradients: usize,
}

impl SvgSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        if self.header.is_empty() {
            return empty_svg(&Viewport::default());
        }
        format!(
            "{}<defs>{}</defs>{}</svg>",
            self.header, self.defs, self.body
        )
    }
}

impl Surface for SvgSurface {
    fn begin(&mut self, viewport: &Viewport) {
        let (w, h) = viewport.backing_size();
        self.header = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {} {}">"#,
            viewport.width, viewport.height
        );
        self.defs.clear();
        self.body.clear();
        self.gradients = 0;
    }

    fn line(&mut self, from: Point, to: Point, color: Rgba, width: f64) {
        let _ = write!(
            self.body,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}"/>"#,
            from.x,
            from.y,
            to.x,
            to.y,
            color.css(),
            width
        );
    }

    fn fill_area(&mut self, points: &[Point], gradient: &Gradient) {
        self.gradients += 1;
        let id = format!("fill{}", self.gradients);
        let _ = write!(
            self.defs,
            r#"<linearGradient id="{id}" gradientUnits="userSpaceOnUse" x1="0" y1="{}" x2="0" y2="{}"><stop offset="0" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient>"#,
            gradient.y0,
            gradient.y1,
            gradient.top.css(),
            gradient.bottom.css()
        );
        let _ = write!(
            self.body,
            r#"<polygon points="{}" fill="url(#{id})"/>"#,
            points_attr(points)
        );
    }

    fn polyline(&mut self, points: &[Point], color: Rgba, width: f64) {
        let _ = write!(
            self.body,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linejoin="round"/>"#,
            points_attr(points),
            color.css(),
            width
        );
    }

    fn text(&mut self, text: &str, at: Point, align: TextAlign, color: Rgba, font: &str) {
        let anchor = match align {
            TextAlign::Right => "end",
        };
        let _ = write!(
            self.body,
            r#"<text x="{}" y="{}" text-anchor="{anchor}" fill="{}" style="font: {}">{}</text>"#,
            at.x,
            at.y,
            color.css(),
            escape(font),
            escape(text)
        );
    }
}

pub fn render_frame(frame: &ChartFrame) -> String {
    let mut surface = SvgSurface::new();
    paint(&frame.commands, &mut surface);
    surface.finish()
}

/// Blank document for the empty state.
pub fn empty_svg(viewport: &Viewport) -> String {
    let (w, h) = viewport.backing_size();
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {} {}"></svg>"#,
        viewport.width, viewport.height
    )
}

fn points_attr(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{:.2},{:.2}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartRenderer, TimeRange};
    use crate::metrics::Sample;

    #[test]
    fn svg_scales_to_backing_resolution() {
        let samples = [Sample::new(1_000, 70.0), Sample::new(2_000, 72.0)];
        let frame = ChartRenderer::default()
            .render(
                &samples,
                TimeRange::FifteenMinutes,
                Viewport::new(400.0, 200.0, 2.0),
                3_000,
            )
            .unwrap();
        let svg = render_frame(&frame);
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="400" viewBox="0 0 400 200">"#));
        assert_eq!(svg.matches("<line ").count(), 6);
        assert_eq!(svg.matches("<text ").count(), 6);
        assert!(svg.contains(r#"stop-color="rgba(10, 132, 255, 0.3)""#));
        assert!(svg.contains(r##"stroke="#0A84FF""##));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn empty_state_is_a_blank_document() {
        let svg = empty_svg(&Viewport::new(100.0, 50.0, 1.0));
        assert!(!svg.contains("<line"));
        assert!(svg.contains(r#"width="100""#));
    }
}
