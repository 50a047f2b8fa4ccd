//! HTML fragments for the results panel and the live overlay.

use std::fmt::Write;

use crate::types::Detection;

/// Render the results panel for a still image.
pub fn render_results(image: Option<&str>, detections: &[Detection]) -> String {
    if detections.is_empty() {
        return render_no_detections();
    }

    let mut html = String::from("<div class=\"result-item\">\n");
    if let Some(src) = image {
        let _ = writeln!(
            html,
            "  <img src=\"{}\" alt=\"Processed image\" class=\"result-image\">",
            escape(src)
        );
    }
    html.push_str("  <div class=\"result-info\">\n");
    html.push_str(&render_cards(detections));
    html.push_str("  </div>\n</div>\n");
    html
}

/// Render the overlay shown over the live camera view.
pub fn render_overlay(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return render_no_detections();
    }
    render_cards(detections)
}

fn render_cards(detections: &[Detection]) -> String {
    let mut html = String::from("<div class=\"detection-cards\">\n");
    for (index, detection) in detections.iter().enumerate() {
        let class = label_class(&detection.label);
        let glyph = if detection.is_masked() { "😷" } else { "😐" };
        let _ = write!(
            html,
            concat!(
                "<div class=\"detection-card {class}\">\n",
                "  <div>\n",
                "    <div class=\"detection-label {class}\">{glyph} {label}</div>\n",
                "    <div class=\"detection-bbox\">Face {number}</div>\n",
                "  </div>\n",
                "  <div class=\"confidence-score\">{confidence:.1}%</div>\n",
                "</div>\n",
            ),
            class = class,
            glyph = glyph,
            label = escape(&detection.label),
            number = index + 1,
            confidence = detection.confidence,
        );
    }
    html.push_str("</div>\n");
    html
}

fn render_no_detections() -> String {
    concat!(
        "<div class=\"no-detections\">\n",
        "  <div class=\"no-detections-icon\">😕</div>\n",
        "  <p>No faces detected in the image</p>\n",
        "  <p class=\"text-muted\">Make sure the image contains visible faces</p>\n",
        "</div>\n",
    )
    .to_string()
}

/// CSS class for a label: lower-cased, whitespace collapsed to `-`, anything
/// else dropped.
fn label_class(label: &str) -> String {
    let mut class = String::with_capacity(label.len());
    for ch in label.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            class.push(ch.to_ascii_lowercase());
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !class.ends_with('-') {
            class.push('-');
        }
    }
    class
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_list_renders_placeholder() {
        let html = render_results(None, &[]);
        assert!(html.contains("no-detections"));
        assert!(html.contains("No faces detected in the image"));
        assert!(!html.contains("detection-card"));
    }

    #[test]
    fn single_detection_renders_one_card() {
        let html = render_results(Some("/static/out.jpg"), &[Detection::new("Masked", 97.2)]);
        assert_eq!(html.matches("<div class=\"detection-card ").count(), 1);
        assert!(html.contains("😷 Masked"));
        assert!(html.contains("97.2%"));
        assert!(html.contains("Face 1"));
        assert!(html.contains("src=\"/static/out.jpg\""));
    }

    #[test]
    fn cards_are_numbered_in_order() {
        let html = render_overlay(&[
            Detection::new("No Mask", 61.04),
            Detection::new("Mask", 88.0),
        ]);
        let first = html.find("Face 1").unwrap();
        let second = html.find("Face 2").unwrap();
        assert!(first < second);
        assert!(html.contains("61.0%"));
        assert!(html.contains("88.0%"));
        assert!(html.contains("😐 No Mask"));
        assert!(!html.contains("result-image"));
    }

    #[test]
    fn labels_and_sources_are_escaped() {
        let html = render_results(
            Some("x\" onerror=\"alert(1)"),
            &[Detection::new("<b>Mask</b>", 50.0)],
        );
        assert!(html.contains("&lt;b&gt;Mask&lt;/b&gt;"));
        assert!(html.contains("x&quot; onerror=&quot;alert(1)"));
        assert!(!html.contains("<b>"));
    }

    #[rstest]
    #[case::single_word("Masked", "masked")]
    #[case::two_words("No Mask", "no-mask")]
    #[case::extra_spaces("  No   Mask ", "no-mask")]
    #[case::markup("<Mask>", "mask")]
    fn label_class_slugs(#[case] label: &str, #[case] expected: &str) {
        assert_eq!(label_class(label), expected);
    }
}
