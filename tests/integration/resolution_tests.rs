use crate::common::{single_target, Fixture};
use tandem::core::models::TargetState;

#[tokio::test]
async fn test_alias_wins_over_packages() {
    let fixture = Fixture::new();
    fixture
        .write("src/main.ts", "import { origin } from 'utils';\nexport const where = origin;\n")
        .write("src/alias-utils.ts", "export const origin = 'from-alias';\n")
        .write("node_modules/utils/package.json", r#"{ "name": "utils", "version": "1.0.0", "main": "index.js" }"#)
        .write("node_modules/utils/index.js", "export const origin = 'from-package';\n");

    let report = fixture
        .build(&single_target(
            r#""input": { "main": "src/main.ts" },
               "alias": { "utils": "./src/alias-utils.ts" },
               "output": [{ "dir": "dist" }]"#,
        ))
        .await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let main = fixture.read("dist/main.js");
    assert!(main.contains("from-alias"));
    assert!(!main.contains("from-package"));
}

#[tokio::test]
async fn test_externals_and_browser_shims() {
    let fixture = Fixture::new();
    fixture.write(
        "src/main.ts",
        "import watcher from 'fsevents';\nexport const canWatch = (): boolean => watcher !== null;\n",
    );
    let config = r#"{
        "base": { "input": { "main": "src/main.ts" } },
        "targets": [
            {
                "name": "node",
                "external": ["fsevents"],
                "output": [{ "dir": "dist/node" }],
                "license_dir": "dist/node"
            },
            {
                "name": "browser",
                "platform": "browser",
                "substitutions": { "fsevents": { "shim": "export default null;" } },
                "output": [{ "dir": "dist/browser" }],
                "license_dir": "dist/browser"
            }
        ]
    }"#;

    let report = fixture.build(config).await;
    assert!(report.succeeded(), "{:?}", report.targets);

    let node = fixture.read("dist/node/main.js");
    assert!(node.contains("from 'fsevents';"));

    let browser = fixture.read("dist/browser/main.js");
    assert!(!browser.contains("'fsevents'"));
    assert!(browser.contains("null"));
}

#[tokio::test]
async fn test_unresolved_import_fails_the_target() {
    let fixture = Fixture::new();
    fixture.write("src/main.ts", "import { gone } from './gone';\nexport const g = gone;\n");

    let report = fixture
        .build(&single_target(r#""input": { "main": "src/main.ts" }, "output": [{ "dir": "dist" }]"#))
        .await;

    let node = report.target("node").unwrap();
    assert_eq!(node.state, TargetState::Failed);
    let error = node.error.as_ref().unwrap();
    assert!(error.contains("Could not resolve './gone'"), "{}", error);
    assert!(error.contains("Transforming"), "{}", error);
    assert!(!fixture.exists("dist"));
}
