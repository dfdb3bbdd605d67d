use gvendor_sync::extract::{content_hash, extract, normalize_line_endings, place};
use gvendor_sync::paths::normalize;
use gvendor_sync::PositionSpec;
use proptest::prelude::*;

fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z ]{0,12}", 1..20)
}

fn join_with(lines: &[String], crlf: &[bool]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push_str(if crlf[i % crlf.len()] { "\r\n" } else { "\n" });
        }
        out.push_str(line);
    }
    out
}

proptest! {
    #[test]
    fn mixed_line_endings_normalize_to_lf(
        lines in lines_strategy(),
        crlf in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let mixed = join_with(&lines, &crlf);
        let normalized = normalize_line_endings(mixed.as_bytes());
        prop_assert_eq!(normalized, lines.join("\n").into_bytes());
        prop_assert_eq!(content_hash(mixed.as_bytes()), content_hash(lines.join("\n").as_bytes()));
    }

    #[test]
    fn whole_file_extract_hash_matches_content_hash(
        lines in lines_strategy(),
        crlf in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let text = join_with(&lines, &crlf);
        let got = extract(text.as_bytes(), &PositionSpec::to_eof(1)).unwrap();
        prop_assert_eq!(got.hash, content_hash(text.as_bytes()));
    }

    #[test]
    fn place_keeps_every_line_outside_the_range(
        lines in lines_strategy(),
        a in 0usize..20,
        b in 0usize..20,
        insert in "[A-Z]{0,8}",
    ) {
        let n = lines.len();
        let (start, end) = {
            let (x, y) = (a % n + 1, b % n + 1);
            (x.min(y), x.max(y))
        };
        let text = lines.join("\n");
        let placed = place(text.as_bytes(), &insert, &PositionSpec::lines(start, end)).unwrap();

        let prefix: String = lines[..start - 1].iter().map(|l| format!("{l}\n")).collect();
        let suffix: String = lines[end..].iter().map(|l| format!("\n{l}")).collect();
        prop_assert_eq!(placed, format!("{prefix}{insert}{suffix}"));
    }

    #[test]
    fn placing_an_extract_back_is_identity(
        lines in lines_strategy(),
        a in 0usize..20,
        b in 0usize..20,
    ) {
        let n = lines.len();
        let spec = PositionSpec::lines((a % n + 1).min(b % n + 1), (a % n + 1).max(b % n + 1));
        let text = lines.join("\n");
        let got = extract(text.as_bytes(), &spec).unwrap();
        prop_assert_eq!(place(text.as_bytes(), &got.text, &spec).unwrap(), text);
    }

    #[test]
    fn position_display_parses_back(
        start in 1usize..500,
        span in 0usize..50,
        start_col in 0usize..40,
        end_col in 0usize..40,
        to_eof in any::<bool>(),
    ) {
        let mut spec = PositionSpec {
            start_line: start,
            end_line: start + span,
            start_col,
            end_col,
            to_eof,
        };
        if span == 0 && start_col > 0 && end_col > 0 && end_col < start_col {
            spec.end_col = start_col;
        }
        prop_assume!(spec.validate().is_ok());

        let rendered = spec.to_string();
        let parsed = PositionSpec::parse(&rendered).unwrap();
        prop_assert_eq!(parsed.to_string(), rendered);
        prop_assert_eq!(parsed.start_line, spec.start_line);
        prop_assert_eq!(parsed.to_eof, spec.to_eof);
        if !spec.to_eof {
            prop_assert_eq!(parsed.last_line(), spec.last_line());
        }
    }

    #[test]
    fn path_normalization_is_idempotent(
        parts in prop::collection::vec(prop::sample::select(vec!["a", "b", ".", "..", "", "c.go"]), 1..8),
        backslash in any::<bool>(),
    ) {
        let sep = if backslash { "\\" } else { "/" };
        let raw = parts.join(sep);
        let once = normalize(&raw);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(!once.contains('\\'));
        prop_assert!(!once.ends_with('/') || once == "/");
    }
}
