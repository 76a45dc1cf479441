use super::*;

const METRICS: LineMetrics = LineMetrics::new(10.0, 4);

#[test]
fn tab_advances_to_next_stop() {
    // 'a' covers [0,10), the tab jumps to 40, 'b' covers [40,50).
    assert_eq!(hover_character(45.0, "a\tb", METRICS), Some(2));
    assert_eq!(hover_character(39.9, "a\tb", METRICS), Some(1));
    assert_eq!(hover_character(9.9, "a\tb", METRICS), Some(0));
}

#[test]
fn right_half_of_glyph_stays_on_that_glyph() {
    assert_eq!(hover_character(16.0, "abc", METRICS), Some(1));
    assert_eq!(hover_character(10.0, "abc", METRICS), Some(1));
    assert_eq!(hover_character(19.999, "abc", METRICS), Some(1));
}

#[test]
fn out_of_bounds_is_no_match() {
    assert_eq!(hover_character(-0.5, "abc", METRICS), None);
    assert_eq!(hover_character(30.0, "abc", METRICS), None);
    assert_eq!(hover_character(f64::NAN, "abc", METRICS), None);
    assert_eq!(hover_character(0.0, "", METRICS), None);
}

#[test]
fn unusable_metrics_never_match() {
    assert_eq!(hover_character(5.0, "abc", LineMetrics::new(0.0, 4)), None);
    assert_eq!(hover_character(5.0, "abc", LineMetrics::new(f64::INFINITY, 4)), None);
}

#[test]
fn zero_tab_size_is_treated_as_one() {
    assert_eq!(hover_character(15.0, "\tx", LineMetrics::new(10.0, 0)), Some(1));
}

#[test]
fn consecutive_tabs_land_on_successive_stops() {
    // Stops at 40 and 80; 'x' covers [80,90).
    let text = "\t\tx";
    assert_eq!(hover_character(35.0, text, METRICS), Some(0));
    assert_eq!(hover_character(79.0, text, METRICS), Some(1));
    assert_eq!(hover_character(85.0, text, METRICS), Some(2));
}

#[test]
fn resolved_index_is_monotonic() {
    let text = "fn\tmain() {\t\tlet x = 1; }\tz";
    let mut previous = 0usize;
    let mut x = 0.0;
    while x < 400.0 {
        if let Some(index) = hover_character(x, text, METRICS) {
            assert!(index >= previous, "index went backwards at x={x}");
            previous = index;
        }
        x += 0.7;
    }
}

#[test]
fn leading_tab_measures_from_line_edge() {
    let sample = PointerSample {
        client_x: 145.0,
        line_left: 100.0,
        line_padding_left: 0.0,
        first_run_left: 140.0,
        first_run_padding_left: 0.0,
    };
    assert_eq!(content_x(&sample, "\tfoo"), 45.0);
    assert_eq!(content_x(&sample, "foo"), 5.0);
    assert_eq!(resolve_pointer(&sample, "\tfoo", METRICS), Some(1));
    assert_eq!(resolve_pointer(&sample, "foo", METRICS), Some(0));
}

#[test]
fn char_offsets_convert_to_byte_offsets() {
    let text = "héllo";
    assert_eq!(byte_offset_of_char(text, 0), Some(0));
    assert_eq!(byte_offset_of_char(text, 2), Some(3));
    assert_eq!(byte_offset_of_char(text, 5), Some(text.len()));
    assert_eq!(byte_offset_of_char(text, 6), None);
    assert_eq!(split_at_char(text, 2), Some(("hé", "llo")));
}
