use atelier_lib::workspace::Directory;

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const BLUE: &str = "\x1b[34m";
}

const BRANCH: &str = "\u{251c}\u{2500}\u{2500} ";
const LAST_BRANCH: &str = "\u{2514}\u{2500}\u{2500} ";
const PIPE: &str = "\u{2502}   ";
const SPACE: &str = "    ";

/// Draw a directory as a box-drawing tree, directories before files
pub fn render_tree(root: &Directory, use_color: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if use_color {
        lines.push(format!("{}{}{}", Color::BOLD, root.name, Color::RESET));
    } else {
        lines.push(root.name.clone());
    }
    render_children(root, "", use_color, &mut lines);
    lines
}

fn render_children(dir: &Directory, prefix: &str, use_color: bool, lines: &mut Vec<String>) {
    let total = dir.dirs.len() + dir.files.len();
    let mut idx = 0;

    for sub in &dir.dirs {
        idx += 1;
        let is_last = idx == total;
        let connector = if is_last { LAST_BRANCH } else { BRANCH };
        if use_color {
            lines.push(format!("{}{}{}{}/{}", prefix, connector, Color::BLUE, sub.name, Color::RESET));
        } else {
            lines.push(format!("{}{}{}/", prefix, connector, sub.name));
        }
        let child_prefix = format!("{}{}", prefix, if is_last { SPACE } else { PIPE });
        render_children(sub, &child_prefix, use_color, lines);
    }

    for file in &dir.files {
        idx += 1;
        let connector = if idx == total { LAST_BRANCH } else { BRANCH };
        lines.push(format!("{}{}{}", prefix, connector, file));
    }
}
