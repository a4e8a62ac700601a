use crate::common::{single_target, Fixture};

#[tokio::test]
async fn test_commonjs_dependency_is_bundled() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import add from 'legacy-add';\nexport const three = add(1, 2);\n")
        .write(
            "node_modules/legacy-add/package.json",
            r#"{ "name": "legacy-add", "version": "0.3.0", "main": "index.js" }"#,
        )
        .write(
            "node_modules/legacy-add/index.js",
            "module.exports = function add(a, b) { return a + b; };\n",
        );

    let report = fixture
        .build(&single_target(r#""input": { "main": "src/main.ts" }, "output": [{ "dir": "dist" }]"#))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.contains("a + b"));
    assert!(!main.contains("require("));
    assert!(!main.contains("from 'legacy-add'"));
}

#[tokio::test]
async fn test_json_and_text_assets() {
    let fixture = Fixture::new();
    fixture
        .write(
            "src/main.ts",
            "import { version } from './meta.json';\nimport help from './help.md';\nexport const usage = help + version;\n",
        )
        .write("src/meta.json", r#"{ "name": "demo-cli", "version": "4.5.6" }"#)
        .write("src/help.md", "Usage: tandem build\n");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "stages": [{ "stage": "json" }, { "stage": "string" }],
               "output": [{ "dir": "dist" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.contains("\"4.5.6\""));
    assert!(!main.contains("demo-cli"));
    assert!(main.contains("\"Usage: tandem build\\n\""));
}

#[tokio::test]
async fn test_json_without_its_stage_fails() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { version } from './meta.json';\nexport const v = version;\n")
        .write("src/meta.json", r#"{ "version": "4.5.6" }"#);

    let report = fixture
        .build(&single_target(r#""input": { "main": "src/main.ts" }, "output": [{ "dir": "dist" }]"#))
        .await;
    assert_eq!(report.exit_code(), 1);
    assert!(!fixture.exists("dist"));
}

#[tokio::test]
async fn test_minify_stage_runs_on_chunks() {
    let fixture = Fixture::new();
    fixture.write(
        "src/main.ts",
        "export function greeting(name: string): string {\n    const prefix = 'Hello, ';\n    return prefix + name;\n}\n",
    );

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "stages": [{ "stage": "minify" }],
               "output": [{ "dir": "dist", "banner": "/*! kept */" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.starts_with("/*! kept */\n"));
    assert!(!main.contains("\n\t"));
    assert!(main.contains("greeting"));
}
