//! Unified-diff helpers: added lines with their new-file line numbers.

/// Iterate the added lines of a unified diff as `(line_number, content)`.
///
/// Line numbers follow the `+c,d` side of each `@@` hunk header. A patch without
/// hunk headers numbers lines by position (1-based). `+++`/`---` file headers are
/// recognised only before the first hunk.
pub fn added_lines(patch: &str) -> AddedLines<'_> {
  AddedLines {
    lines: patch.lines(),
    next_new_line: 1,
    in_hunk: false,
  }
}

pub struct AddedLines<'a> {
  lines: std::str::Lines<'a>,
  next_new_line: u32,
  in_hunk: bool,
}

impl<'a> Iterator for AddedLines<'a> {
  type Item = (u32, &'a str);

  fn next(&mut self) -> Option<Self::Item> {
    for line in self.lines.by_ref() {
      if line.starts_with("@@") {
        if let Some(start) = hunk_new_start(line) {
          self.next_new_line = start;
          self.in_hunk = true;
        }
        continue;
      }
      if !self.in_hunk && (line.starts_with("+++") || line.starts_with("---")) {
        continue;
      }
      if let Some(content) = line.strip_prefix('+') {
        let n = self.next_new_line;
        self.next_new_line = self.next_new_line.saturating_add(1);
        return Some((n, content));
      }
      if line.starts_with('-') || line.starts_with('\\') {
        // Removed lines and "\ No newline at end of file" do not advance the new side.
        continue;
      }
      self.next_new_line = self.next_new_line.saturating_add(1);
    }
    None
  }
}

/// Parse the new-file start line from `@@ -a,b +c,d @@ ...`.
fn hunk_new_start(header: &str) -> Option<u32> {
  let plus = header.split_whitespace().find(|tok| tok.starts_with('+'))?;
  let digits = plus[1..].split(',').next()?;
  digits.parse().ok()
}

/// Number of added lines in a patch.
pub fn count_added(patch: &str) -> u32 {
  added_lines(patch).count() as u32
}
