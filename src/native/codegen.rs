//! C source generation for a trained forest.
//!
//! The generated library exposes:
//!
//! ```text
//! size_t get_num_feature(void);
//! size_t get_num_tree(void);
//! double predict(const double* data, int pred_margin);
//! ```
//!
//! `predict` returns the positive-class probability, or the raw margin when
//! `pred_margin` is non-zero. NaN inputs follow the right branch, matching
//! [`Tree::predict`](crate::ml::gbdt::Tree::predict).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::ml::gbdt::{BinaryForest, Node, Tree};

/// Name of the shared header included by every unit.
pub const HEADER_NAME: &str = "calgrid_model.h";

/// Options controlling the shape of the generated sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Compare integer bin indices instead of raw doubles.
    pub quantize: bool,
    /// Number of translation units to spread trees over; `0` keeps one unit.
    pub parallel_units: usize,
}

/// A generated source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// File name relative to the build directory.
    pub file_name: String,
    /// File contents.
    pub contents: String,
    /// Whether the unit is compiled (headers are not).
    pub compile: bool,
}

/// Generate the complete set of sources for a forest.
pub fn generate_sources(model: &BinaryForest, options: CodegenOptions) -> Vec<SourceUnit> {
    let tables = options.quantize.then(|| ThresholdTables::from_model(model));
    let mut units = vec![SourceUnit {
        file_name: HEADER_NAME.to_string(),
        contents: header(model),
        compile: false,
    }];

    let mut main = String::new();
    main.push_str(&format!("#include \"{HEADER_NAME}\"\n\n"));
    if let Some(tables) = &tables {
        main.push_str(&tables.quantize_function());
    }
    main.push_str(&exported_functions(model, tables.is_some()));

    if options.parallel_units == 0 {
        main.push_str(&tree_functions(model, 0..model.trees.len(), tables.as_ref()));
    } else {
        let units_count = options.parallel_units.min(model.trees.len().max(1));
        for (unit_idx, range) in split_ranges(model.trees.len(), units_count)
            .into_iter()
            .enumerate()
        {
            let mut contents = format!("#include \"{HEADER_NAME}\"\n\n");
            contents.push_str(&tree_functions(model, range, tables.as_ref()));
            units.push(SourceUnit {
                file_name: format!("tu{unit_idx}.c"),
                contents,
                compile: true,
            });
        }
    }
    units.push(SourceUnit {
        file_name: "main.c".to_string(),
        contents: main,
        compile: true,
    });
    units
}

fn header(model: &BinaryForest) -> String {
    let mut out = String::new();
    out.push_str("#ifndef CALGRID_MODEL_H\n#define CALGRID_MODEL_H\n\n");
    out.push_str("#include <math.h>\n#include <stddef.h>\n\n");
    // `cl /LD` exports only symbols marked dllexport.
    out.push_str(
        "#ifdef _WIN32\n#define CALGRID_EXPORT __declspec(dllexport)\n#else\n#define CALGRID_EXPORT\n#endif\n\n",
    );
    let _ = writeln!(out, "#define CALGRID_NUM_FEATURE {}", model.num_features());
    let _ = writeln!(out, "#define CALGRID_NUM_TREE {}\n", model.trees.len());
    for idx in 0..model.trees.len() {
        let _ = writeln!(
            out,
            "double calgrid_tree_{idx}(const double* data, const int* qdata);"
        );
    }
    out.push_str("\n#endif\n");
    out
}

fn exported_functions(model: &BinaryForest, quantized: bool) -> String {
    let mut out = String::new();
    out.push_str("CALGRID_EXPORT size_t get_num_feature(void) { return CALGRID_NUM_FEATURE; }\n\n");
    out.push_str("CALGRID_EXPORT size_t get_num_tree(void) { return CALGRID_NUM_TREE; }\n\n");
    out.push_str("CALGRID_EXPORT double predict(const double* data, int pred_margin) {\n");
    if quantized {
        out.push_str("  int qdata[CALGRID_NUM_FEATURE];\n");
        out.push_str("  calgrid_quantize(data, qdata);\n");
    } else {
        out.push_str("  const int* qdata = NULL;\n");
    }
    let _ = writeln!(out, "  double sum = {};", literal(model.init_score));
    for idx in 0..model.trees.len() {
        let _ = writeln!(out, "  sum += calgrid_tree_{idx}(data, qdata);");
    }
    out.push_str("  if (pred_margin) {\n    return sum;\n  }\n");
    out.push_str("  return 1.0 / (1.0 + exp(-sum));\n}\n\n");
    out
}

fn tree_functions(
    model: &BinaryForest,
    range: std::ops::Range<usize>,
    tables: Option<&ThresholdTables>,
) -> String {
    let mut out = String::new();
    for idx in range {
        let tree = &model.trees[idx];
        let _ = writeln!(
            out,
            "double calgrid_tree_{idx}(const double* data, const int* qdata) {{"
        );
        out.push_str("  (void)data;\n  (void)qdata;\n");
        emit_node(&mut out, tree, 0, 1, tables);
        out.push_str("}\n\n");
    }
    out
}

fn emit_node(out: &mut String, tree: &Tree, idx: usize, depth: usize, tables: Option<&ThresholdTables>) {
    let pad = "  ".repeat(depth);
    match &tree.nodes[idx] {
        Node::Leaf { value } => {
            let _ = writeln!(out, "{pad}return {};", literal(*value));
        }
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let condition = match tables {
                Some(tables) => format!(
                    "qdata[{feature}] <= {}",
                    tables.index_of(*feature, *threshold)
                ),
                None => format!("data[{feature}] <= {}", literal(*threshold)),
            };
            let _ = writeln!(out, "{pad}if ({condition}) {{");
            emit_node(out, tree, *left, depth + 1, tables);
            let _ = writeln!(out, "{pad}}} else {{");
            emit_node(out, tree, *right, depth + 1, tables);
            let _ = writeln!(out, "{pad}}}");
        }
    }
}

/// Sorted unique split thresholds per feature.
///
/// A value `x` quantizes to the count of thresholds strictly below it, so
/// `x <= t[k]` holds exactly when `q(x) <= k`. NaN quantizes past every index.
#[derive(Debug, Clone, Default, PartialEq)]
struct ThresholdTables {
    per_feature: BTreeMap<usize, Vec<f64>>,
}

impl ThresholdTables {
    fn from_model(model: &BinaryForest) -> Self {
        let mut per_feature: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for tree in &model.trees {
            for node in &tree.nodes {
                if let Node::Split {
                    feature, threshold, ..
                } = node
                {
                    per_feature.entry(*feature).or_default().push(*threshold);
                }
            }
        }
        for thresholds in per_feature.values_mut() {
            thresholds.sort_by(f64::total_cmp);
            thresholds.dedup();
        }
        Self { per_feature }
    }

    fn index_of(&self, feature: usize, threshold: f64) -> usize {
        self.per_feature
            .get(&feature)
            .map(|thresholds| thresholds.partition_point(|&t| t < threshold))
            .unwrap_or(0)
    }

    fn quantize_function(&self) -> String {
        let mut out = String::new();
        for (feature, thresholds) in &self.per_feature {
            let values: Vec<String> = thresholds.iter().map(|&t| literal(t)).collect();
            let _ = writeln!(
                out,
                "static const double calgrid_thr_{feature}[{}] = {{{}}};",
                thresholds.len(),
                values.join(", ")
            );
        }
        out.push('\n');
        out.push_str(
            "static int calgrid_lower_bound(const double* table, int len, double value) {\n",
        );
        out.push_str("  int lo = 0;\n  int hi = len;\n");
        out.push_str("  while (lo < hi) {\n    int mid = lo + (hi - lo) / 2;\n");
        out.push_str("    if (table[mid] < value) {\n      lo = mid + 1;\n    } else {\n      hi = mid;\n    }\n  }\n");
        out.push_str("  return lo;\n}\n\n");
        out.push_str("static void calgrid_quantize(const double* data, int* qdata) {\n");
        out.push_str("  int i;\n  for (i = 0; i < CALGRID_NUM_FEATURE; ++i) {\n    qdata[i] = 0;\n  }\n");
        for (feature, thresholds) in &self.per_feature {
            let len = thresholds.len();
            let _ = writeln!(
                out,
                "  qdata[{feature}] = isnan(data[{feature}]) ? {len} : calgrid_lower_bound(calgrid_thr_{feature}, {len}, data[{feature}]);"
            );
        }
        out.push_str("}\n\n");
        out
    }
}

fn split_ranges(len: usize, parts: usize) -> Vec<std::ops::Range<usize>> {
    let parts = parts.max(1);
    let base = len / parts;
    let extra = len % parts;
    let mut start = 0;
    (0..parts)
        .map(|part| {
            let size = base + usize::from(part < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// C literal that round-trips the exact `f64` value.
fn literal(value: f64) -> String {
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}
