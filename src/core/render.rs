//! Text representations of the forest.

use std::fmt;

use itertools::Itertools;

use super::forest::Forest;

const TREE_SEPARATION: usize = 3;
const LEGEND_SEPARATION: usize = 4;
const NODE_SPACING: usize = 1;
const BRANCH_SPACING: usize = 2;

/// Text placed on the canvas at `(x, y)`, `y` counting up from the bottom.
struct Glyph {
    x: usize,
    y: usize,
    text: String,
}

impl Glyph {
    fn new(x: usize, y: usize, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

/// Drawing of a subtree: its top right corner, the column of its root and
/// the glyphs.
struct Drawing {
    top_right_x: usize,
    top_right_y: usize,
    root_x: usize,
    glyphs: Vec<Glyph>,
}

fn optional(idx: Option<usize>) -> String {
    idx.map_or_else(|| "-".to_string(), |idx| idx.to_string())
}

impl Forest {
    /// Local tree in ms style, starting from the local MRCA.
    ///
    /// Sample leaves are written as their index plus one, leaves above height
    /// zero as `0+height`. Branch lengths are divided by `Ne * scaling` if
    /// `scaling` is positive. Nodes with a single child are skipped.
    pub fn newick(&self, scaling: f64) -> String {
        format!("{};", self.newick_node(self.topology.local_mrca, scaling))
    }

    fn scale(&self, height: f64, scaling: f64) -> f64 {
        if scaling > 0. {
            height / (self.ne * scaling)
        } else {
            height
        }
    }

    fn skip_unary(&self, mut node: usize) -> usize {
        while let Some((child, None)) = self.topology.children(node) {
            node = child;
        }
        node
    }

    fn newick_node(&self, node: usize, scaling: f64) -> String {
        let node = self.skip_unary(node);
        let Some((first, Some(second))) = self.topology.children(node) else {
            let height = self.store.height(node);
            return if height == 0. {
                format!("{}", node + 1)
            } else {
                format!("0+{:.3}", self.scale(height, scaling))
            };
        };

        let height = self.store.height(node);
        let [left, right] = [first.max(second), first.min(second)].map(|child| {
            let child = self.skip_unary(child);
            let length = self.scale(height - self.store.height(child), scaling);
            format!("{}:{length:.3}", self.newick_node(child, scaling))
        });
        format!("({left},{right})")
    }

    /// Drawing of every tree in the forest with a legend of node heights.
    pub fn ascii(&self) -> String {
        let mut glyphs = Vec::new();
        let mut x_offset = 0;
        let mut max_y = 0;
        for root in self.store.roots() {
            let drawing = self.draw_subtree(x_offset, root);
            max_y = max_y.max(drawing.top_right_y);
            x_offset = drawing.top_right_x + TREE_SEPARATION;
            glyphs.extend(drawing.glyphs);
        }
        let legend_x = x_offset.saturating_sub(TREE_SEPARATION) + LEGEND_SEPARATION;
        let mut legend = self.draw_legend(legend_x);
        legend.extend(glyphs);

        let mut canvas: Vec<Vec<char>> = vec![Vec::new(); max_y + 1];
        for glyph in legend {
            if glyph.y >= canvas.len() {
                canvas.resize(glyph.y + 1, Vec::new());
            }
            let line = &mut canvas[glyph.y];
            for (offset, c) in glyph.text.chars().enumerate() {
                let x = glyph.x + offset;
                if x >= line.len() {
                    line.resize(x + 1, ' ');
                }
                line[x] = c;
            }
        }
        canvas
            .iter()
            .rev()
            .map(|line| line.iter().collect::<String>().trim_end().to_string())
            .join("\n")
    }

    /// Row of `node` on the canvas; nodes at equal heights share a row.
    fn ascii_row(&self, node: usize) -> usize {
        let duplicates = (0..node)
            .filter(|&n| self.store.height(n) == self.store.height(n + 1))
            .count();
        NODE_SPACING * node.saturating_sub(duplicates)
    }

    fn draw_legend(&self, x: usize) -> Vec<Glyph> {
        let mut glyphs = Vec::new();
        for node in self.samples.saturating_sub(1)..self.store.capacity() {
            if !self.store.is_used(node) {
                continue;
            }
            let y = self.ascii_row(node);
            glyphs.push(Glyph::new(x, y, format!("{:.1}", self.store.height(node))));
            if y % 5 == 0 && y > 0 {
                for dot in (1..x.saturating_sub(1)).step_by(2) {
                    glyphs.push(Glyph::new(dot, y, "."));
                }
            }
        }
        glyphs
    }

    fn draw_subtree(&self, x_offset: usize, node: usize) -> Drawing {
        let y = self.ascii_row(node);
        let label = node.to_string();

        let Some((first, second)) = self.topology.children(node) else {
            return Drawing {
                top_right_x: x_offset + label.len() - 1,
                top_right_y: y,
                root_x: x_offset,
                glyphs: vec![Glyph::new(x_offset, y, label)],
            };
        };
        let (first, second) = match second {
            Some(second) => (first.max(second), Some(first.min(second))),
            None => (first, None),
        };

        let left = self.draw_subtree(x_offset, first);
        let mut glyphs = left.glyphs;
        for row in left.top_right_y + 1..y {
            glyphs.push(Glyph::new(left.root_x, row, "|"));
        }

        let (top_right_x, x_node) = match second {
            None => (
                left.top_right_x.max(left.root_x + label.len() - 1),
                left.root_x,
            ),
            Some(second) => {
                let right = self.draw_subtree(left.top_right_x + BRANCH_SPACING, second);
                let x_node = (left.root_x + right.root_x) / 2;
                glyphs.extend(right.glyphs);

                glyphs.push(Glyph::new(left.root_x, y, "/"));
                for x in left.root_x + 1..x_node {
                    glyphs.push(Glyph::new(x, y, "-"));
                }
                for row in right.top_right_y + 1..y {
                    glyphs.push(Glyph::new(right.root_x, row, "|"));
                }
                glyphs.push(Glyph::new(right.root_x, y, "\\"));
                for x in x_node + 1..right.root_x {
                    glyphs.push(Glyph::new(x, y, "-"));
                }
                (right.top_right_x, x_node)
            }
        };

        glyphs.push(Glyph::new(x_node, y, label));
        Drawing {
            top_right_x,
            top_right_y: y,
            root_x: x_node,
            glyphs,
        }
    }

    /// Node arrays column by column, for trace logs.
    pub fn debug_table(&self) -> String {
        let range = 0..self.store.capacity();
        let row = |title: &str, cells: Vec<String>| {
            format!("{title:<10}{}", cells.iter().map(|cell| format!("{cell:>4}")).join("  "))
        };
        [
            row("index:", range.clone().map(|idx| idx.to_string()).collect()),
            row(
                "parents:",
                range.clone().map(|idx| self.store.parent(idx).to_string()).collect(),
            ),
            row(
                "onechild:",
                range.clone().map(|idx| optional(self.topology.child(idx))).collect(),
            ),
            row(
                "siblings:",
                range.clone().map(|idx| optional(self.topology.sibling(idx))).collect(),
            ),
            row(
                "status:",
                range.clone().map(|idx| self.topology.status(idx).to_string()).collect(),
            ),
            format!(
                "{:<10}{}",
                "height:",
                range
                    .map(|idx| format!("{:>5.0}", self.store.height(idx)))
                    .join(" ")
            ),
        ]
        .join("\n")
    }
}

impl fmt::Display for Forest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.ascii())
    }
}
