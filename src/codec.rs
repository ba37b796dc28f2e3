/*!
Field-level escaping for the account file.

A field is wrapped in quotes only when it has to be: when it contains the
separator, a quote, or a line break (bare `\r` included). Quotes inside a
quoted field are doubled. Reading follows quotes across line breaks, so a
quoted line break never splits a row.
*/

pub const SEPARATOR: char = ',';
const QUOTE: char = '"';

fn needs_quotes(s: &str) -> bool {
    s.contains(|c: char| matches!(c, SEPARATOR | QUOTE | '\n' | '\r'))
}

/// Escape a single value for writing. The empty string stays empty.
pub fn encode(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_owned();
    }

    let mut s = String::with_capacity(value.len() + 2);
    s.push(QUOTE);
    for c in value.chars() {
        if c == QUOTE {
            s.push(QUOTE);
        }
        s.push(c);
    }
    s.push(QUOTE);
    s
}

/// Escape and join a row of fields. No line terminator is added.
pub fn encode_row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = String::new();
    for (n, f) in fields.into_iter().enumerate() {
        if n > 0 {
            row.push(SEPARATOR);
        }
        row.push_str(&encode(f.as_ref()));
    }
    row
}

/**
Split the text of one row into its fields.

A quote anywhere in a field switches between quoted and unquoted text; the
quotes themselves are dropped. Inside quoted text a doubled quote is one
literal quote, and separators and line breaks are literal. A quote left
open at the end just runs to the end of the row.

Empty text is a row with a single empty field. This never fails.
*/
pub fn decode(row_text: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = row_text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            QUOTE => {
                if in_quotes && chars.peek() == Some(&QUOTE) {
                    chars.next();
                    current.push(QUOTE);
                } else {
                    in_quotes = !in_quotes;
                }
            },
            SEPARATOR if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            },
            c => { current.push(c); },
        }
    }
    fields.push(current);

    fields
}

/// Whether quoted text is still open after `line`, given whether it was
/// open before. Every quote flips the state; a doubled quote flips it back.
fn open_after(line: &str, open_before: bool) -> bool {
    let n_quotes = line.chars().filter(|&c| c == QUOTE).count();
    open_before ^ (n_quotes % 2 == 1)
}

/**
Split the contents of a whole file into rows of fields.

Rows are lines ending in `\n` (or `\r\n`); blank lines are skipped. A line
that leaves a quote open continues onto the following lines, but only if
some later line closes it. A quote that never closes is taken to be damage
confined to its own line, which is decoded by itself, and reading goes on
with the next line.

Rows may have differing lengths; fixing that is the caller's business.
Bytes that aren't valid UTF-8 are replaced.
*/
pub fn decode_rows(bytes: &[u8]) -> Vec<Vec<String>> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.split('\n').collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut n = 0;
    while n < lines.len() {
        let mut last = n;
        let mut open = open_after(lines[n], false);
        while open && last + 1 < lines.len() {
            last += 1;
            open = open_after(lines[last], open);
        }

        let row_text = if open {
            log::warn!(
                "Line {} has a quote that never closes; reading it by itself.",
                n + 1
            );
            last = n;
            lines[n].to_owned()
        } else {
            lines[n..=last].join("\n")
        };

        let row_text = row_text.strip_suffix('\r').unwrap_or(&row_text);
        if !row_text.is_empty() {
            rows.push(decode(row_text));
        }
        n = last + 1;
    }

    rows
}
