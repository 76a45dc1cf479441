use expect_test::expect;

use super::*;

/// `[text]` per fragment, with markers appended after a `|`.
fn render(line: &FragmentLine) -> String {
    line.fragments()
        .map(|fragment| {
            if fragment.markers().is_empty() {
                format!("[{}]", fragment.text())
            } else {
                let markers: Vec<String> = fragment.markers().iter().map(|marker| format!("{marker:?}")).collect();
                format!("[{}|{}]", fragment.text(), markers.join(","))
            }
        })
        .collect()
}

fn starts(line: &FragmentLine) -> Vec<usize> {
    line.fragments().map(Fragment::start).collect()
}

#[test]
fn empty_runs_are_dropped_on_construction() {
    let line = FragmentLine::new(["let", "", " x", ""]);
    assert_eq!(starts(&line), vec![0, 3]);
    assert_eq!(line.len(), 5);
    assert_eq!(line.text(), "let x");
}

#[test]
fn locate_finds_fragment_containing_interior_offset() {
    let line = FragmentLine::new(["abc", "def", "gh"]);
    assert_eq!(line.locate(0).map(Fragment::start), Some(0));
    assert_eq!(line.locate(2).map(Fragment::start), Some(0));
    assert_eq!(line.locate(3).map(Fragment::start), Some(3));
    assert_eq!(line.locate(5).map(Fragment::start), Some(3));
    assert_eq!(line.locate(7).map(Fragment::start), Some(6));
    assert!(line.locate(8).is_none());
}

#[test]
fn split_inside_fragment_preserves_text() {
    let mut line = FragmentLine::new(["hello world"]);
    assert!(line.split_at(5));
    assert_eq!(starts(&line), vec![0, 5]);
    assert_eq!(line.text(), "hello world");
}

#[test]
fn split_at_boundary_or_outside_is_noop() {
    let mut line = FragmentLine::new(["ab", "cd"]);
    let before = line.clone();

    assert!(!line.split_at(0));
    assert!(!line.split_at(2));
    assert!(!line.split_at(4));
    assert!(!line.split_at(99));
    assert_eq!(line, before);
}

#[test]
fn split_copies_style_to_both_halves() {
    let mut line = FragmentLine::new([Run::styled("identifier", "pl-en")]);
    line.mark(0, 10, Marker::Underline);
    line.split_at(4);

    let classes: Vec<Option<&str>> = line.fragments().map(Fragment::class).collect();
    assert_eq!(classes, vec![Some("pl-en"), Some("pl-en")]);
    assert!(line.fragments().all(|fragment| fragment.has_marker(Marker::Underline)));
}

#[test]
fn select_range_spanning_several_fragments() {
    let mut line = FragmentLine::new(["foo.", "bar", "(baz)"]);
    let selected: Vec<String> = line.select_range(2, 9).iter().map(|fragment| fragment.text().to_string()).collect();
    assert_eq!(selected, vec!["o.", "bar", "(b"]);

    expect![[r#"[fo][o.][bar][(b][az)]"#]].assert_eq(&render(&line));
    assert_eq!(line.text(), "foo.bar(baz)");
}

#[test]
fn select_range_matching_existing_boundaries_does_not_split() {
    let mut line = FragmentLine::new(["foo", "bar", "baz"]);
    let selected = line.select_range(3, 6).len();
    assert_eq!(selected, 1);
    assert_eq!(line.fragment_count(), 3);
}

#[test]
fn invalid_interval_selects_nothing() {
    let mut line = FragmentLine::new(["short"]);
    assert!(line.select_range(3, 3).is_empty());
    assert!(line.select_range(4, 2).is_empty());
    assert!(line.select_range(2, 6).is_empty());
    assert_eq!(line.fragment_count(), 1);
}

#[test]
fn never_creates_empty_fragments() {
    let mut line = FragmentLine::new(["a", "bcd", "ef"]);
    for (start, end) in [(0, 1), (1, 2), (2, 4), (0, 6), (5, 6), (3, 5)] {
        line.mark(start, end, Marker::Highlighted);
    }
    assert!(line.fragments().all(|fragment| !fragment.text().is_empty()));
    assert_eq!(line.text(), "abcdef");
}

#[test]
fn every_interval_keeps_text_and_boundaries_intact() {
    let runs = ["fn ", "größe", "(", "→x", "🦀", " }"];
    let original = FragmentLine::new(runs);
    let text = original.text();
    let chars: Vec<char> = text.chars().collect();
    assert_eq!(original.len(), chars.len());

    for start in 0..=chars.len() {
        for end in start..=chars.len() {
            let mut line = original.clone();
            let selected: String = line.select_range(start, end).iter().map(|fragment| fragment.text()).collect();
            let expected: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            assert_eq!(selected, expected, "[{start}, {end})");
            assert_eq!(line.text(), text, "[{start}, {end})");
            assert_eq!(line.len(), chars.len());

            let mut offset = 0;
            for fragment in line.fragments() {
                assert!(!fragment.text().is_empty(), "[{start}, {end}) left an empty fragment");
                assert_eq!(fragment.start(), offset, "[{start}, {end})");
                offset = fragment.end();
            }
            assert_eq!(offset, chars.len());
        }
    }
}

#[test]
fn marking_and_unmarking_an_occurrence() {
    let mut line = FragmentLine::new(["    let ", "value", " = other_value;"]);
    assert_eq!(line.mark(8, 13, Marker::Hovered), 1);
    assert_eq!(line.mark(22, 27, Marker::Highlighted), 1);

    expect![[r#"[    let ][value|Hovered][ = other_][value|Highlighted][;]"#]].assert_eq(&render(&line));
    assert_eq!(line.marked_ranges(Marker::Hovered), vec![(8, 13)]);

    line.unmark(8, 13, Marker::Hovered);
    line.clear_marker(Marker::Highlighted);
    assert!(line.marked_ranges(Marker::Hovered).is_empty());
    assert!(line.marked_ranges(Marker::Highlighted).is_empty());
}

#[test]
fn marked_ranges_merge_adjacent_fragments() {
    let mut line = FragmentLine::new(["ab", "cd", "ef"]);
    line.mark(1, 5, Marker::Underline);
    assert_eq!(line.marked_ranges(Marker::Underline), vec![(1, 5)]);
}

#[test]
fn offsets_count_characters_not_bytes() {
    let mut line = FragmentLine::new(["let ", "ñame", " = \"日本\";"]);
    assert_eq!(line.len(), 16);

    line.mark(4, 8, Marker::Hovered);
    line.mark(13, 14, Marker::Highlighted);
    let hovered: Vec<&str> = line
        .fragments()
        .filter(|fragment| fragment.has_marker(Marker::Hovered))
        .map(Fragment::text)
        .collect();
    let highlighted: Vec<&str> = line
        .fragments()
        .filter(|fragment| fragment.has_marker(Marker::Highlighted))
        .map(Fragment::text)
        .collect();
    assert_eq!(hovered, vec!["ñame"]);
    assert_eq!(highlighted, vec!["本"]);
    assert_eq!(line.text(), "let ñame = \"日本\";");
}

#[test]
fn tooltip_covers_only_the_selected_interval() {
    let mut line = FragmentLine::plain("call(arg)");
    line.set_tooltip(0, 4, Some("fn call(x: i32)"));
    assert_eq!(line.tooltip_at(0), Some("fn call(x: i32)"));
    assert_eq!(line.tooltip_at(3), Some("fn call(x: i32)"));
    assert_eq!(line.tooltip_at(4), None);

    line.set_tooltip(0, 4, None);
    assert_eq!(line.tooltip_at(0), None);
}
