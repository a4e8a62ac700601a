use crate::common::{single_target, Fixture};
use tandem::core::models::TargetState;
use tandem::BuildError;

fn two_platform_project() -> Fixture {
    let fixture = Fixture::new();
    fixture
        .write(
            "package.json",
            r#"{ "name": "demo", "version": "1.2.3", "license": "MIT", "homepage": "https://example.org" }"#,
        )
        .write(
            "src/main.ts",
            "import { platformName } from './platform';\nexport const describe = (): string => 'running on ' + platformName;\n",
        )
        .write(
            "src/platform.ts",
            "import { readFileSync } from 'fs';\nexport const platformName: string = 'node';\nexport const read = (p: string) => readFileSync(p, 'utf8');\n",
        )
        .write("src/platform.browser.ts", "export const platformName: string = 'browser';\n");
    fixture
}

const TWO_TARGETS: &str = r#"{
    "base": {
        "input": { "main": "src/main.ts" },
        "treeshake": { "module_side_effects": false }
    },
    "targets": [
        {
            "name": "node",
            "platform": "node",
            "external": ["fsevents"],
            "output": [{ "dir": "dist/node", "banner": "/* {name} v{version} ({license}) */" }],
            "license_dir": "dist/node"
        },
        {
            "name": "browser",
            "platform": "browser",
            "substitutions": { "./src/platform.ts": "./src/platform.browser.ts" },
            "output": [{ "dir": "dist/browser", "module_package_file": "package.json" }],
            "license_dir": "dist/browser"
        }
    ]
}"#;

#[tokio::test]
async fn test_node_and_browser_targets() {
    let fixture = two_platform_project();
    let report = fixture.build(TWO_TARGETS).await;

    assert_eq!(report.exit_code(), 0, "{:?}", report.targets);
    assert!(report.targets.iter().all(|t| t.state == TargetState::Succeeded));

    let node = fixture.read("dist/node/main.js");
    assert!(node.starts_with("/* demo v1.2.3 (MIT) */\n"));
    assert!(node.contains("\"node\""));
    assert!(!node.contains("readFileSync"));

    let browser = fixture.read("dist/browser/main.js");
    assert!(browser.contains("\"browser\""));
    assert!(!browser.contains("\"node\""));
    assert_eq!(fixture.read("dist/browser/package.json"), "{\"type\":\"module\"}\n");

    assert!(fixture.exists("dist/node/LICENSE.md"));
    assert!(fixture.exists("dist/browser/LICENSE.md"));
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let fixture = two_platform_project();
    fixture
        .write("src/second.ts", "import { platformName } from './platform';\nexport const second = platformName + '!';\n");
    let config = TWO_TARGETS
        .replace(
            r#""input": { "main": "src/main.ts" }"#,
            r#""input": { "main": "src/main.ts", "second": "src/second.ts" }"#,
        )
        .replace(r#""license_dir": "dist/node""#, r#""license_dir": "dist/node", "clean_dir": "dist/node""#);

    let snapshot = |fixture: &Fixture| -> Vec<(String, String)> {
        let mut files = Vec::new();
        for dir in ["dist/node", "dist/browser"] {
            let mut names: Vec<String> = std::fs::read_dir(fixture.root().join(dir))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            for name in names {
                let file = format!("{}/{}", dir, name);
                files.push((file.clone(), fixture.read(&file)));
            }
        }
        files
    };

    assert!(fixture.build(&config).await.succeeded());
    let first = snapshot(&fixture);
    assert!(fixture.build(&config).await.succeeded());
    let second = snapshot(&fixture);

    assert_eq!(first, second);
    assert!(first.iter().any(|(name, _)| name == "dist/node/module-platform.js"));
}

#[tokio::test]
async fn test_naming_conflict_is_detected_before_any_write() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "export const main = 1;\n")
        .write("src/core.ts", "export const core = 1;\n");
    let config = fixture.config(&single_target(
        r#""input": { "main": "src/main.ts", "module-core": "src/core.ts" },
           "manual_chunks": { "core": ["src/core.ts"] },
           "output": [{ "dir": "dist" }]"#,
    ));

    let err = Fixture::driver(&config).run(&config).await.unwrap_err();
    assert!(matches!(err, BuildError::ChunkNamingConflict { ref file_name, .. } if file_name == "module-core.js"));
    assert!(!fixture.exists("dist"));
}

#[tokio::test]
async fn test_fatal_warning_gate() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { missing } from './lib';\nexport const value = missing;\n")
        .write("src/lib.ts", "export const present = 1;\n");
    let options = r#""input": { "main": "src/main.ts" }, "output": [{ "dir": "dist" }]"#;

    let report = fixture.build(&single_target(options)).await;
    let node = report.target("node").unwrap();
    assert_eq!(node.state, TargetState::Failed);
    assert_eq!(node.diagnostics[0].code, "MISSING_EXPORT");
    assert!(!fixture.exists("dist"));
    assert!(!fixture.exists("LICENSE.md"));

    let advisory = format!(r#"{}, "warning_policy": "advisory""#, options);
    let report = fixture.build(&single_target(&advisory)).await;
    assert!(report.succeeded());
    assert!(fixture.read("dist/main.js").contains("undefined"));
}

#[tokio::test]
async fn test_failed_target_does_not_affect_the_other() {
    let fixture = two_platform_project();
    let config = TWO_TARGETS.replace(
        r#""name": "browser","#,
        r#""name": "browser", "input": { "main": "src/does-not-exist.ts" },"#,
    );

    let report = fixture.build(&config).await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.target("browser").unwrap().state, TargetState::Failed);
    assert!(report.target("browser").unwrap().error.as_ref().unwrap().contains("does-not-exist"));
    assert_eq!(report.target("node").unwrap().state, TargetState::Succeeded);
    assert!(fixture.exists("dist/node/main.js"));
    assert!(!fixture.exists("dist/browser"));
}

#[tokio::test]
async fn test_cjs_format() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { double } from './math';\nexport const four = double(2);\nexport { double };\n")
        .write("src/math.ts", "export function double(n: number): number { return n * 2; }\n");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "output": [{ "dir": "dist/cjs", "format": "cjs", "module_package_file": "package.json" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/cjs/main.js");
    assert!(main.starts_with("'use strict';\n"));
    assert!(main.contains("exports.four = four;"));
    assert!(main.contains("exports.double = double;"));
    assert!(!main.contains("export {"));
    assert_eq!(fixture.read("dist/cjs/package.json"), "{\"type\":\"commonjs\"}\n");
}

#[tokio::test]
async fn test_source_map_is_written_next_to_the_chunk() {
    let fixture = Fixture::new();
    fixture.write("src/main.ts", "export const answer: number = 42;\n");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "output": [{ "dir": "dist", "sourcemap": true, "banner": "/* banner */" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.starts_with("/* banner */\n"));
    assert!(main.ends_with("//# sourceMappingURL=main.js.map\n"));

    let map: serde_json::Value = serde_json::from_str(&fixture.read("dist/main.js.map")).unwrap();
    assert_eq!(map["sources"][0], "../src/main.ts");
}
