//! `{name}` / `{name:spec}` templates with safe substitution
//!
//! Unknown names are left in place as `{name}`. Format specs follow a
//! subset of the familiar `[[fill]align][0][width][.precision][type]`
//! mini-language, with types `d`, `f` and `s`. Text values that look like
//! numbers are formatted as numbers.

use crate::tags::{TagSet, TagValue};

/// Fill `template`, leaving unknown placeholders untouched
pub fn format(template: &str, lookup: impl Fn(&str) -> Option<TagValue>) -> String {
    format_with(template, lookup, str::to_string)
}

/// Fill `template` from a tag set (names are canonicalized)
pub fn format_tags(template: &str, tags: &TagSet) -> String {
    format(template, |name| tags.get(name).cloned())
}

/// Fill `template`, passing every substituted value through `escape`
pub fn format_with(
    template: &str,
    lookup: impl Fn(&str) -> Option<TagValue>,
    escape: impl Fn(&str) -> String,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let field = &tail[1..close];
        let (name, spec) = field.split_once(':').unwrap_or((field, ""));

        match lookup(name.trim()) {
            Some(value) => out.push_str(&escape(&apply_spec(&value, &FormatSpec::parse(spec)))),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<Align>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Self {
        let mut parsed = FormatSpec::default();
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;

        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        };

        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            parsed.fill = Some(chars[0]);
            parsed.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().and_then(|c| align_of(*c)) {
            parsed.align = Some(align);
            i = 1;
        }

        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }

        let digits: String = chars[i..].iter().take_while(|c| c.is_ascii_digit()).collect();
        i += digits.len();
        parsed.width = digits.parse().unwrap_or(0);

        if chars.get(i) == Some(&'.') {
            let digits: String = chars[i + 1..].iter().take_while(|c| c.is_ascii_digit()).collect();
            i += 1 + digits.len();
            parsed.precision = digits.parse().ok();
        }

        parsed.kind = chars.get(i).copied();
        parsed
    }
}

/// Number view of a value, parsing numeric-looking text
fn numeric(value: &TagValue) -> Option<TagValue> {
    match value {
        TagValue::Int(_) | TagValue::Float(_) => Some(value.clone()),
        TagValue::Text(s) => match TagValue::parse(s) {
            parsed @ (TagValue::Int(_) | TagValue::Float(_)) => Some(parsed),
            _ => None,
        },
        TagValue::List(_) => None,
    }
}

fn apply_spec(value: &TagValue, spec: &FormatSpec) -> String {
    let number = if spec.kind == Some('s') {
        None
    } else {
        numeric(value)
    };

    let body = match (&number, spec.kind) {
        (Some(TagValue::Int(i)), Some('f')) => format!("{:.*}", spec.precision.unwrap_or(6), *i as f64),
        (Some(TagValue::Float(f)), Some('f')) => format!("{:.*}", spec.precision.unwrap_or(6), f),
        (Some(TagValue::Float(f)), Some('d')) => format!("{}", f.trunc() as i64),
        (Some(TagValue::Float(f)), None) => match spec.precision {
            Some(p) => format!("{f:.p$}"),
            None => format!("{f}"),
        },
        (Some(TagValue::Int(i)), _) => i.to_string(),
        _ => {
            let text = value.to_string();
            match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
    };

    let is_number = number.is_some();
    pad(body, spec, is_number)
}

fn pad(body: String, spec: &FormatSpec, is_number: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;

    if spec.zero && spec.align.is_none() && is_number {
        let (sign, digits) = match body.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", body.as_str()),
        };
        return format!("{sign}{}{digits}", "0".repeat(missing));
    }

    let fill = spec
        .fill
        .unwrap_or(if spec.zero { '0' } else { ' ' })
        .to_string();
    let align = spec
        .align
        .unwrap_or(if is_number { Align::Right } else { Align::Left });

    match align {
        Align::Left => format!("{body}{}", fill.repeat(missing)),
        Align::Right => format!("{}{body}", fill.repeat(missing)),
        Align::Center => {
            let left = missing / 2;
            format!("{}{body}{}", fill.repeat(left), fill.repeat(missing - left))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> TagSet {
        let mut tags = TagSet::new();
        tags.set("title", "Overworld");
        tags.set("track", "3");
        tags.set("disc", TagValue::Int(1));
        tags.set("bpm", TagValue::Float(120.5));
        tags
    }

    #[test]
    fn test_basic_substitution() {
        assert_eq!(format_tags("{title}.wav", &tags()), "Overworld.wav");
        assert_eq!(format_tags("{tracknumber:02}-{title}", &tags()), "03-Overworld");
    }

    #[test]
    fn test_unknown_left_literal() {
        assert_eq!(format_tags("{dir}/{title}", &tags()), "{dir}/Overworld");
        assert_eq!(format_tags("{missing:03d}", &tags()), "{missing:03d}");
    }

    #[test]
    fn test_escapes_and_unclosed() {
        assert_eq!(format_tags("{{title}} }} {title", &tags()), "{title} } {title");
    }

    #[test]
    fn test_format_specs() {
        let t = tags();
        assert_eq!(format_tags("{disc:>3}", &t), "  1");
        assert_eq!(format_tags("{disc:*<3}", &t), "1**");
        assert_eq!(format_tags("{title:^11}", &t), " Overworld ");
        assert_eq!(format_tags("{title:.4}", &t), "Over");
        assert_eq!(format_tags("{bpm:.2f}", &t), "120.50");
        assert_eq!(format_tags("{bpm:d}", &t), "120");
        assert_eq!(format_tags("{track:s}", &t), "3");
        assert_eq!(format_tags("{track:03d}", &t), "003");
    }

    #[test]
    fn test_escape_applies_to_values_only() {
        let out = format_with(
            "{a}/{b}",
            |name| Some(TagValue::from(format!("x/{name}"))),
            |v| v.replace('/', "_"),
        );
        assert_eq!(out, "x_a/x_b");
    }
}
