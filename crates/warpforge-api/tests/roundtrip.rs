//! Byte-exact round-trips for every document shape persisted on disk.
//!
//! Files written by the tool must satisfy `encode(decode(bytes)) == bytes`;
//! these fixtures are canonical-form documents (no insignificant whitespace,
//! keys in declared order) of each kind.

use warpforge_api::CatalogMirrorsCapsule;
use warpforge_api::CatalogModuleCapsule;
use warpforge_api::FormulaAndContext;
use warpforge_api::ModuleCapsule;
use warpforge_api::PlotCapsule;
use warpforge_api::Release;
use warpforge_api::RunRecord;
use warpforge_api::codec;

fn assert_bit_exact<T>(fixture: &str)
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let value: T = codec::decode(fixture.as_bytes()).expect("fixture should decode");
    let encoded = codec::encode(&value).expect("value should encode");
    assert_eq!(std::str::from_utf8(&encoded).unwrap(), fixture);

    // Idempotence: decode(encode(v)) encodes identically.
    let again: T = codec::decode(&encoded).expect("canonical bytes should decode");
    assert_eq!(codec::encode(&again).unwrap(), encoded);
}

#[test]
fn test_module_file() {
    assert_bit_exact::<ModuleCapsule>(r#"{"module.v1":{"name":"example.org/hello"}}"#);
}

#[test]
fn test_catalog_module_file() {
    assert_bit_exact::<CatalogModuleCapsule>(
        r#"{"catalogmodule.v1":{"name":"example.com/module","metadata":{},"releases":{"v1.0":"abc","v0.9":"def"}}}"#,
    );
}

#[test]
fn test_release_file() {
    assert_bit_exact::<Release>(
        r#"{"releaseName":"v1.0","metadata":{"replay":"deadbeef"},"items":{"x86_64":"tar:abcd","arm64":"tar:efgh"}}"#,
    );
}

#[test]
fn test_mirrors_file() {
    assert_bit_exact::<CatalogMirrorsCapsule>(
        r#"{"catalogmirrors.v1":{"byWare":{"tar:abcd":["https://a.example/w.tgz","https://b.example/w.tgz"]},"byModule":{"git":["https://example.com/repo.git"]}}}"#,
    );
}

#[test]
fn test_plot_file() {
    assert_bit_exact::<PlotCapsule>(
        r#"{"plot.v1":{"inputs":{"rootfs":"catalog:example.com/module:v1.0:x86_64","src":"ingest:git:.:HEAD"},"steps":{"build":{"protoformula":{"inputs":{"/":"pipe::rootfs","/src":"pipe::src","$MODE":"literal:release"},"action":{"script":{"interpreter":"/bin/sh","contents":["mkdir /out","cp -r /src /out"],"network":false}},"outputs":{"out":{"from":"/out","packtype":"tar"}}}}},"outputs":{"output":"pipe:build:out"}}}"#,
    );
}

#[test]
fn test_formula_file() {
    assert_bit_exact::<FormulaAndContext>(
        r#"{"formula":{"formula.v1":{"inputs":{"/":"ware:tar:abcd123","/work":"mount:overlay:.","$MSG":"literal:hi"},"action":{"exec":{"command":["/bin/echo","hello"],"network":false}},"outputs":{"out":{"from":"/out","packtype":"tar"},"note":{"from":"$NOTE"}}}},"context":{"context.v1":{"warehouses":{"tar:abcd123":"https://warehouse.example/w.tgz"}}}}"#,
    );
}

#[test]
fn test_runrecord_file() {
    assert_bit_exact::<RunRecord>(
        r#"{"guid":"2f2b0fc4","time":1634850353,"formulaID":"f00dfeed","exitcode":0,"results":{"out":"ware:tar:abcd123","note":"literal:done"}}"#,
    );
}

#[test]
fn test_echo_action_shape() {
    assert_bit_exact::<warpforge_api::Action>(r#"{"echo":{}}"#);
}
