//! End-to-end preprocessing tests against on-disk copybook trees.

use std::fs;
use std::path::PathBuf;

use open_mainframe_copybook::{
    CopybookConfig, Diagnostic, PreprocessError, Preprocessor, Severity, SourceFormat,
    SourceLocation,
};
use tempfile::TempDir;

/// A temporary source tree.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write fixed-format code lines, each starting in column 8.
    fn write(&self, rel: &str, lines: &[&str]) -> PathBuf {
        let text: String = lines.iter().map(|l| format!("       {l}\n")).collect();
        self.write_raw(rel, &text)
    }

    fn write_raw(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    fn config(&self) -> CopybookConfig {
        let mut config = CopybookConfig::new();
        config.add_directory(self.path("copy")).add_extension("cpy");
        config
    }
}

fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
    diags.iter().filter(|d| d.severity() == Severity::Error).collect()
}

#[test]
fn copy_inlines_copybook_text() {
    let ws = Workspace::new();
    let book = ws.write("copy/A.cpy", &["X VALUE 1."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "X VALUE 1.");
    assert!(out.diagnostics.is_empty());
    assert!(out.provenance.covers(out.text.len()));
    assert_eq!(out.location(0), Some(SourceLocation::new(&book, 1, 8)));
    assert_eq!(
        out.trail(2),
        vec![
            SourceLocation::new(&book, 1, 10),
            SourceLocation::new(&root, 1, 8),
        ]
    );
    assert_eq!(out.dependencies(), &[book]);
}

#[test]
fn copy_replacing_rewrites_copybook() {
    let ws = Workspace::new();
    let book = ws.write("copy/A.cpy", &["MOVE FOO TO BAR-2."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A REPLACING ==FOO== BY ==BAR==."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "MOVE BAR TO BAR-2.");
    assert!(out.provenance.covers(out.text.len()));
    // Substituted text maps to where FOO was.
    assert_eq!(out.location(5), Some(SourceLocation::new(&book, 1, 13)));
    assert_eq!(out.location(7), Some(SourceLocation::new(&book, 1, 13)));
    assert_eq!(out.location(9), Some(SourceLocation::new(&book, 1, 17)));
}

#[test]
fn missing_copybook_is_reported_and_contributes_nothing() {
    let ws = Workspace::new();
    let root = ws.write("src/MAIN.cbl", &["01 R.", "COPY MISSING.", "05 Y PIC X."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "01 R.\n05 Y PIC X.");
    let diags = out.diagnostics.clone().into_vec();
    assert_eq!(diags.len(), 1);
    match &diags[0] {
        Diagnostic::UnresolvedCopy {
            identifier,
            location,
        } => {
            assert_eq!(identifier, "MISSING");
            assert_eq!(location, &SourceLocation::new(&root, 2, 8));
        }
        other => panic!("unexpected diagnostic: {other}"),
    }
    assert!(out.provenance.covers(out.text.len()));
    assert_eq!(out.location(6), Some(SourceLocation::new(&root, 3, 8)));
}

#[test]
fn nested_copybooks_expand_depth_first() {
    let ws = Workspace::new();
    let outer = ws.write("copy/OUTER.cpy", &["01 OUTER-REC.", "COPY INNER.", "05 OUTER-END PIC X."]);
    let inner = ws.write("copy/INNER.cpy", &["05 INNER-FLD PIC 9."]);
    let root = ws.write("src/MAIN.cbl", &["WORKING-STORAGE SECTION.", "COPY OUTER."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(
        out.text,
        "WORKING-STORAGE SECTION.\n01 OUTER-REC.\n05 INNER-FLD PIC 9.\n05 OUTER-END PIC X."
    );
    assert!(out.diagnostics.is_empty());
    assert!(out.provenance.covers(out.text.len()));
    assert_eq!(out.dependencies(), &[outer.clone(), inner.clone()]);

    let offset = out.text.find("INNER-FLD").unwrap();
    assert_eq!(
        out.trail(offset),
        vec![
            SourceLocation::new(&inner, 1, 11),
            SourceLocation::new(&outer, 2, 8),
            SourceLocation::new(&root, 2, 8),
        ]
    );
}

#[test]
fn explicit_file_beats_directory() {
    let ws = Workspace::new();
    let special = ws.write("special/BOOK.cpy", &["SPECIAL."]);
    ws.write("copy/BOOK.cpy", &["GENERAL."]);
    let root = ws.write("src/MAIN.cbl", &["COPY BOOK."]);

    let mut config = ws.config();
    config.add_file(&special);
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "SPECIAL.");
}

#[test]
fn earlier_directory_beats_later() {
    let ws = Workspace::new();
    ws.write("first/BOOK.cpy", &["FIRST."]);
    ws.write("second/BOOK.cpy", &["SECOND."]);
    let root = ws.write("src/MAIN.cbl", &["COPY BOOK."]);

    let mut config = CopybookConfig::new();
    config
        .add_directory(ws.path("first"))
        .add_directory(ws.path("second"))
        .add_extension("cpy");
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "FIRST.");
}

#[test]
fn earlier_explicit_file_beats_later() {
    let ws = Workspace::new();
    let first = ws.write("first/BOOK.cpy", &["FIRST."]);
    let second = ws.write("second/BOOK.cpy", &["SECOND."]);
    let root = ws.write("src/MAIN.cbl", &["COPY BOOK."]);

    let mut config = CopybookConfig::new();
    config.add_file(&first).add_file(&second).add_extension("cpy");
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "FIRST.");
    assert_eq!(out.dependencies(), &[first]);
}

#[test]
fn explicit_file_list_prefers_exact_name() {
    let ws = Workspace::new();
    let exact = ws.write("books/SomeCopyBook", &["EXACT."]);
    let cbl = ws.write("books/SomeCopyBook.cbl", &["CBL."]);
    let txt = ws.write("books/SomeCopyBook.txt", &["TXT."]);
    let root = ws.write("src/MAIN.cbl", &["COPY SomeCopyBook."]);

    let mut config = CopybookConfig::new();
    config.add_file(&exact).add_file(&cbl).add_file(&txt);
    for ext in ["someotherextension", "txt", "cbl"] {
        config.add_extension(ext);
    }
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "EXACT.");
    assert!(out.diagnostics.is_empty());
}

#[test]
fn extensionless_file_beats_extension_fallback() {
    let ws = Workspace::new();
    ws.write("copy/SomeCopyBook", &["EXACT."]);
    ws.write("copy/SomeCopyBook.cbl", &["CBL."]);
    ws.write("copy/SomeCopyBook.txt", &["TXT."]);
    let root = ws.write("src/MAIN.cbl", &["COPY SomeCopyBook."]);

    let mut config = CopybookConfig::new();
    config.add_directory(ws.path("copy"));
    for ext in ["someotherextension", "txt", "cbl"] {
        config.add_extension(ext);
    }
    let pre = Preprocessor::new(config);

    assert_eq!(pre.process_file(&root).unwrap().text, "EXACT.");

    fs::remove_file(ws.path("copy/SomeCopyBook")).unwrap();
    assert_eq!(pre.process_file(&root).unwrap().text, "TXT.");
}

#[test]
fn lookup_is_case_insensitive() {
    let ws = Workspace::new();
    ws.write("copy/custrec.cpy", &["01 CUST-REC."]);
    let root = ws.write("src/MAIN.cbl", &["COPY CUSTREC."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();
    assert_eq!(out.text, "01 CUST-REC.");
}

#[test]
fn circular_copy_terminates_with_chain() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["A-LINE.", "COPY B."]);
    ws.write("copy/B.cpy", &["B-LINE.", "COPY A."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "A-LINE.\nB-LINE.");
    let diags = out.diagnostics.clone().into_vec();
    assert_eq!(diags.len(), 1);
    match &diags[0] {
        Diagnostic::CircularInclusion {
            identifier, chain, ..
        } => {
            assert_eq!(identifier, "A");
            assert_eq!(chain, &["A", "B", "A"]);
        }
        other => panic!("unexpected diagnostic: {other}"),
    }
    assert!(out.provenance.covers(out.text.len()));
}

#[test]
fn self_inclusion_is_circular() {
    let ws = Workspace::new();
    ws.write("copy/SELF.cpy", &["01 X PIC X.", "COPY self."]);
    let root = ws.write("src/MAIN.cbl", &["COPY SELF."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "01 X PIC X.");
    assert!(matches!(
        errors(&out.diagnostics.clone().into_vec())[..],
        [Diagnostic::CircularInclusion { .. }]
    ));
}

#[test]
fn diamond_inclusion_expands_each_time() {
    let ws = Workspace::new();
    let a = ws.write("copy/A.cpy", &["COPY C."]);
    let b = ws.write("copy/B.cpy", &["COPY C."]);
    let c = ws.write("copy/C.cpy", &["05 SHARED PIC X."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A.", "COPY B."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "05 SHARED PIC X.\n05 SHARED PIC X.");
    assert!(out.diagnostics.is_empty());
    assert_eq!(out.dependencies(), &[a.clone(), c, b.clone()]);

    let second = out.text.rfind("SHARED").unwrap();
    let trail = out.trail(second);
    assert_eq!(trail[1], SourceLocation::new(&b, 1, 8));
    assert_eq!(trail[2], SourceLocation::new(&root, 2, 8));
}

#[test]
fn depth_limit_is_distinct_from_cycles() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["A-LINE.", "COPY B."]);
    ws.write("copy/B.cpy", &["B-LINE."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A."]);

    let config = ws.config().with_max_depth(1);
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "A-LINE.");
    let diags = out.diagnostics.clone().into_vec();
    assert!(matches!(
        &diags[..],
        [Diagnostic::DepthExceeded { identifier, limit: 1, .. }] if identifier == "B"
    ));
}

#[test]
fn replacing_does_not_reach_nested_copybooks() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["01 FOO-A.", "COPY B."]);
    ws.write("copy/B.cpy", &["01 FOO-B."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A REPLACING ==FOO== BY ==BAR==."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();
    assert_eq!(out.text, "01 BAR-A.\n01 FOO-B.");
}

#[test]
fn replacing_pairs_apply_in_order() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["MOVE :X: TO :Y:."]);
    let root = ws.write(
        "src/MAIN.cbl",
        &["COPY A REPLACING ==:X:== BY ==:Y:==", "               ==:Y:== BY ==WS-Y==."],
    );

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();
    assert_eq!(out.text, "MOVE WS-Y TO WS-Y.");
}

#[test]
fn copy_mid_line_is_spliced_inline() {
    let ws = Workspace::new();
    ws.write("copy/B.cpy", &["05 BB PIC X."]);
    let root = ws.write("src/MAIN.cbl", &["05 A PIC X. COPY B. 05 C PIC X."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "05 A PIC X. 05 BB PIC X. 05 C PIC X.");
    assert!(out.provenance.covers(out.text.len()));
}

#[test]
fn continuation_and_crlf_in_copybook_keep_provenance() {
    let ws = Workspace::new();
    let book = ws.write_raw(
        "copy/CUST.cpy",
        "      * customer record\r\n       01 WS-CUSTOMER-NA\r\n      -    ME PIC X(30).\r\n",
    );
    let root = ws.write("src/MAIN.cbl", &["COPY CUST."]);

    let out = Preprocessor::new(ws.config()).process_file(&root).unwrap();

    assert_eq!(out.text, "01 WS-CUSTOMER-NAME PIC X(30).");
    let me = out.text.find("ME PIC").unwrap();
    assert_eq!(out.location(me), Some(SourceLocation::new(&book, 3, 12)));
    assert_eq!(out.location(0), Some(SourceLocation::new(&book, 2, 8)));
}

#[test]
fn free_format_run() {
    let ws = Workspace::new();
    ws.write_raw("copy/A.cpy", "*> record layout\n01 REC.\n   05 F PIC X. *> field\n");
    let root = ws.write_raw("src/MAIN.cbl", ">>SOURCE FORMAT FREE\nCOPY A.\n");

    let config = ws.config().with_format(SourceFormat::Free);
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "01 REC.\n   05 F PIC X.");
    assert_eq!(out.directives.len(), 1);
    assert_eq!(out.directives[0].text, ">>SOURCE FORMAT FREE");
}

#[test]
fn resolution_is_repeatable() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["X VALUE 1.", "COPY B."]);
    ws.write("copy/B.cpy", &["Y VALUE 2."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A.", "COPY B."]);
    let pre = Preprocessor::new(ws.config());

    let first = pre.process_file(&root).unwrap();
    let second = pre.process_file(&root).unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(first.provenance, second.provenance);
    assert_eq!(first.dependencies(), second.dependencies());
}

#[test]
fn independent_runs_in_parallel() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["X VALUE 1."]);
    let root = ws.write("src/MAIN.cbl", &["01 R.", "COPY A."]);
    let pre = Preprocessor::new(ws.config());
    let expected = pre.process_file(&root).unwrap().text;

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| pre.process_file(&root).unwrap().text))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn unreadable_root_is_fatal() {
    let ws = Workspace::new();
    let err = Preprocessor::new(ws.config())
        .process_file(ws.path("src/NOPE.cbl"))
        .unwrap_err();
    assert!(matches!(err, PreprocessError::RootUnreadable { .. }));
}

#[test]
fn unreadable_copybook_is_recoverable() {
    let ws = Workspace::new();
    let root = ws.write("src/MAIN.cbl", &["01 R.", "COPY GONE."]);

    let mut config = ws.config();
    config.add_file(ws.path("missing/GONE.cpy"));
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "01 R.");
    assert!(out
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::CopyReadFailed { identifier, .. } if identifier == "GONE")));
}

#[test]
fn missing_search_directory_is_a_warning() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["X VALUE 1."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A."]);

    let mut config = CopybookConfig::new();
    config
        .add_directory(ws.path("does-not-exist"))
        .add_directory(ws.path("copy"))
        .add_extension("cpy");
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "X VALUE 1.");
    assert_eq!(out.diagnostics.len(), 1);
    assert!(!out.has_errors());
    assert!(matches!(
        out.diagnostics.iter().next(),
        Some(Diagnostic::DirectoryEnumeration { .. })
    ));
}

#[test]
fn config_file_drives_a_run() {
    let ws = Workspace::new();
    ws.write("copy/A.cpy", &["X VALUE 1."]);
    let root = ws.write("src/MAIN.cbl", &["COPY A."]);
    let config_path = ws.write_raw(
        "copybook.toml",
        "format = \"fixed\"\ncopybook_directories = [\"copy\"]\ncopybook_extensions = [\"cpy\"]\n",
    );

    let config = CopybookConfig::from_file(&config_path).unwrap();
    let out = Preprocessor::new(config).process_file(&root).unwrap();

    assert_eq!(out.text, "X VALUE 1.");
}

#[test]
fn in_memory_root_with_copybooks_on_disk() {
    let ws = Workspace::new();
    let book = ws.write("copy/A.cpy", &["X VALUE 1."]);

    let out = Preprocessor::new(ws.config()).process_text("       COPY A.\n", "MAIN.cbl");

    assert_eq!(out.text, "X VALUE 1.");
    assert_eq!(out.units.len(), 2);
    assert_eq!(out.units[1], book);
    assert!(out.units[0].is_absolute());
    assert!(out.units[0].ends_with("MAIN.cbl"));
}
