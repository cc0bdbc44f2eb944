//! Solver conflict explanation compression
//!
//! Solvers tend to report one line per shift ("Medical short by 2 on shift
//! 14"). Lines that differ only in their numbers collapse into one, with each
//! varying number rendered as `{min-max}`.

/// Split a message into its text template and the numbers found in it
fn template_of(message: &str) -> (String, Vec<f64>) {
    let mut template = String::with_capacity(message.len());
    let mut numbers = Vec::new();
    let mut chars = message.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_ascii_digit() {
            let mut end = start + c.len_utf8();
            while let Some(&(i, next)) = chars.peek() {
                let is_fraction = next == '.'
                    && message[i + 1..].chars().next().is_some_and(|d| d.is_ascii_digit());
                if next.is_ascii_digit() || is_fraction {
                    end = i + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            numbers.push(message[start..end].parse().unwrap_or(0.0));
            template.push_str("{#}");
        } else {
            template.push(c);
        }
    }
    (template, numbers)
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Group {
    template: String,
    first: String,
    ranges: Vec<(f64, f64)>,
    count: usize,
}

/// Collapse messages sharing a template, keeping first-occurrence order
pub fn dedupe(messages: &[String]) -> Vec<String> {
    let mut groups: Vec<Group> = Vec::new();

    for message in messages {
        let (template, numbers) = template_of(message);
        match groups
            .iter_mut()
            .find(|g| g.template == template && g.ranges.len() == numbers.len())
        {
            Some(group) => {
                for (range, n) in group.ranges.iter_mut().zip(&numbers) {
                    range.0 = range.0.min(*n);
                    range.1 = range.1.max(*n);
                }
                group.count += 1;
            }
            None => groups.push(Group {
                template,
                first: message.clone(),
                ranges: numbers.iter().map(|n| (*n, *n)).collect(),
                count: 1,
            }),
        }
    }

    groups
        .into_iter()
        .map(|group| {
            if group.count == 1 {
                return group.first;
            }
            let mut out = String::with_capacity(group.template.len());
            let mut ranges = group.ranges.iter();
            for (i, piece) in group.template.split("{#}").enumerate() {
                if i > 0 {
                    if let Some((min, max)) = ranges.next() {
                        if min == max {
                            out.push_str(&render_number(*min));
                        } else {
                            out.push('{');
                            out.push_str(&render_number(*min));
                            out.push('-');
                            out.push_str(&render_number(*max));
                            out.push('}');
                        }
                    }
                }
                out.push_str(piece);
            }
            out
        })
        .collect()
}
