use fetch_core::{AssetReference, SuffixRules};
use url::Url;

#[test]
fn compressed_and_plain_forms_share_a_stem() {
    let rules = SuffixRules::default();
    assert_eq!(rules.stem("arena_x.bsp"), "arena_x");
    assert_eq!(rules.stem("arena_x.bz2"), "arena_x");
    assert_eq!(rules.stem("arena_x.bsp.bz2"), "arena_x");
}

#[test]
fn stem_ignores_case() {
    let rules = SuffixRules::default();
    assert_eq!(rules.stem("Arena_X.BSP.BZ2"), rules.stem("arena_x.bsp.bz2"));
    assert_eq!(rules.stem("ARENA_X.Bsp"), "arena_x");
}

#[test]
fn stem_of_a_stem_is_unchanged() {
    let rules = SuffixRules::default();
    let once = rules.stem("dm_lockdown.bsp.bz2");
    assert_eq!(rules.stem(&once), once);
}

#[test]
fn only_one_suffix_of_each_kind_is_stripped() {
    let rules = SuffixRules::default();
    // Content suffix first, then archive: only the archive is stripped before content.
    assert_eq!(rules.stem("map.bz2.bsp"), "map.bz2");
    assert_eq!(rules.stem("map.bsp.bsp"), "map.bsp");
}

#[test]
fn unrecognized_names_keep_their_extension() {
    let rules = SuffixRules::default();
    assert_eq!(rules.stem("readme.txt"), "readme.txt");
    assert!(!rules.is_recognized("readme.txt"));
}

#[test]
fn archive_suffix_strip_gives_sibling_name() {
    let rules = SuffixRules::default();
    assert_eq!(rules.strip_archive_suffix("Arena.bsp.BZ2"), Some("Arena.bsp"));
    assert_eq!(rules.strip_archive_suffix("arena.bsp"), None);
}

#[test]
fn custom_rules_apply_to_other_naming_schemes() {
    let rules = SuffixRules::new([".pak", ".wad"], [".gz", ".tar.gz"]);
    assert_eq!(rules.stem("e1m1.wad.gz"), "e1m1");
    assert_eq!(rules.stem("bundle.tar.gz"), "bundle");
    assert!(!rules.is_recognized("e1m1.bsp"));
}

#[test]
fn asset_reference_requires_recognized_suffix() {
    let rules = SuffixRules::default();
    let url = Url::parse("http://fastdl.test/maps/Arena_X.bsp.bz2").unwrap();
    let asset = AssetReference::from_url(url.clone(), &rules).unwrap();
    assert_eq!(asset.url, url);
    assert_eq!(asset.name, "Arena_X.bsp.bz2");
    assert_eq!(asset.stem, "arena_x");
    assert!(asset.is_archive(&rules));

    let page = Url::parse("http://fastdl.test/maps/index.html").unwrap();
    assert!(AssetReference::from_url(page, &rules).is_none());
}
