//! HTML conversion utilities

/// Elements whose content never reaches the output
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "nav", "header", "footer", "aside", "form",
    "button",
];

/// Check if content is HTML based on content type and body
pub fn is_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        let ct_lower = ct.to_lowercase();
        if ct_lower.contains("text/html") || ct_lower.contains("application/xhtml") {
            return true;
        }
    }

    let trimmed = body.trim_start();
    let head: String = trimmed.chars().take(15).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Convert an HTML fragment or document to markdown
pub fn html_to_markdown(html: &str) -> String {
    let mut output = String::new();
    let mut skip_stack: Vec<String> = Vec::new();
    let mut link_stack: Vec<Option<String>> = Vec::new();
    let mut list_depth: usize = 0;
    let mut in_pre = false;
    let mut in_blockquote = false;

    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for next in chars.by_ref() {
                if next == '>' {
                    break;
                }
                tag.push(next);
            }

            // Comments and doctype
            if tag.starts_with('!') || tag.starts_with('?') {
                continue;
            }

            let tag_lower = tag.to_lowercase();
            let is_closing = tag_lower.starts_with('/');
            let tag_name = tag_lower
                .trim_start_matches('/')
                .split(|ch: char| ch.is_whitespace() || ch == '/')
                .next()
                .unwrap_or("")
                .to_string();

            if SKIP_TAGS.contains(&tag_name.as_str()) {
                if is_closing {
                    if let Some(pos) = skip_stack.iter().rposition(|t| *t == tag_name) {
                        skip_stack.truncate(pos);
                    }
                } else if !tag.ends_with('/') {
                    skip_stack.push(tag_name);
                }
                continue;
            }

            if !skip_stack.is_empty() {
                continue;
            }

            match tag_name.as_str() {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    if is_closing {
                        output.push_str("\n\n");
                    } else {
                        let level = tag_name[1..].parse::<usize>().unwrap_or(1);
                        output.push('\n');
                        output.push_str(&"#".repeat(level));
                        output.push(' ');
                    }
                }
                "p" | "div" | "section" | "article" | "main" | "table" => {
                    if is_closing {
                        output.push_str("\n\n");
                    }
                }
                "tr" => {
                    if is_closing {
                        output.push('\n');
                    }
                }
                "td" | "th" => {
                    if is_closing {
                        output.push_str(" | ");
                    }
                }
                "br" => output.push('\n'),
                "hr" => output.push_str("\n---\n"),
                "ul" | "ol" => {
                    if is_closing {
                        list_depth = list_depth.saturating_sub(1);
                        if list_depth == 0 {
                            output.push('\n');
                        }
                    } else {
                        list_depth += 1;
                    }
                }
                "li" => {
                    if !is_closing {
                        output.push('\n');
                        output.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                        output.push_str("- ");
                    }
                }
                "strong" | "b" => output.push_str("**"),
                "em" | "i" => output.push('*'),
                "pre" => {
                    output.push_str("\n```\n");
                    in_pre = !is_closing;
                }
                "code" => {
                    if !in_pre {
                        output.push('`');
                    }
                }
                "blockquote" => {
                    in_blockquote = !is_closing;
                    output.push_str(if is_closing { "\n" } else { "\n> " });
                }
                "a" => {
                    if is_closing {
                        if let Some(href) = link_stack.pop().flatten() {
                            output.push_str(&format!("]({})", href));
                        }
                    } else {
                        let href = extract_attribute(&tag, "href")
                            .filter(|h| !h.is_empty() && !h.starts_with("javascript:"));
                        if href.is_some() {
                            output.push('[');
                        }
                        link_stack.push(href);
                    }
                }
                _ => {}
            }
        } else if skip_stack.is_empty() {
            let decoded = decode_entity(c, &mut chars);
            if in_blockquote && decoded == '\n' {
                output.push_str("\n> ");
            } else {
                output.push(decoded);
            }
        }
    }

    clean_whitespace(&output)
}

/// Extract attribute value from tag
fn extract_attribute(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!("{}=", attr);
    let tag_lower = tag.to_lowercase();

    let start = tag_lower.find(&pattern)?;
    let rest = tag[start + pattern.len()..].trim_start();

    if let Some(rest) = rest.strip_prefix('"') {
        rest.find('"').map(|end| rest[..end].to_string())
    } else if let Some(rest) = rest.strip_prefix('\'') {
        rest.find('\'').map(|end| rest[..end].to_string())
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

/// Decode HTML entity starting from ampersand
fn decode_entity(c: char, chars: &mut std::iter::Peekable<std::str::Chars>) -> char {
    if c != '&' {
        return c;
    }

    let mut entity = String::new();
    while let Some(&next) = chars.peek() {
        if next == ';' {
            chars.next();
            break;
        }
        if next.is_whitespace() || next == '&' || next == '<' || entity.len() > 10 {
            return '&';
        }
        entity.push(next);
        chars.next();
    }

    match entity.as_str() {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" | "#39" => '\'',
        "nbsp" => ' ',
        "mdash" => '—',
        "ndash" => '–',
        "hellip" => '…',
        "copy" => '©',
        "reg" => '®',
        _ => entity
            .strip_prefix('#')
            .and_then(|num| match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            })
            .and_then(char::from_u32)
            .unwrap_or('&'),
    }
}

/// Clean whitespace: collapse runs, trim, keep max 2 newlines
pub fn clean_whitespace(s: &str) -> String {
    let mut result = String::new();
    let mut last_was_space = false;
    let mut newline_count = 0;

    for c in s.chars() {
        if c == '\n' {
            if last_was_space && result.ends_with(' ') {
                result.pop();
            }
            newline_count += 1;
            last_was_space = true;
            if newline_count <= 2 {
                result.push(c);
            }
        } else if c.is_whitespace() {
            newline_count = 0;
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            newline_count = 0;
            last_was_space = false;
            result.push(c);
        }
    }

    result.trim().to_string()
}
