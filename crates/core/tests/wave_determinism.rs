#![forbid(unsafe_code)]

use rollwave_core::{group_into_waves, Resource, APPLY_WAVE_ANNOTATION, DEFAULT_APPLY_WAVE};

fn restore(name: &str, wave: Option<&str>) -> Resource {
    let r = Resource::new("velero.io/v1", "Restore", name, Some("openshift-adp"));
    match wave {
        Some(w) => r.with_annotation(APPLY_WAVE_ANNOTATION, w),
        None => r,
    }
}

fn batch() -> Vec<Resource> {
    vec![
        restore("apps", Some("200")),
        restore("platform", None),
        restore("cluster-scoped", Some("1")),
        restore("namespaces", Some("1")),
        restore("operators", Some("")),
        restore("Zeta", Some("200")),
    ]
}

fn canonical(input: Vec<Resource>) -> Vec<(i64, Vec<String>)> {
    group_into_waves(input)
        .unwrap()
        .into_iter()
        .map(|w| (w.tag, w.items.iter().map(|r| r.name().to_string()).collect()))
        .collect()
}

#[test]
fn input_order_does_not_change_grouping() {
    let forward = canonical(batch());
    let mut reversed = batch();
    reversed.reverse();
    assert_eq!(canonical(reversed), forward);

    let mut rotated = batch();
    rotated.rotate_left(2);
    assert_eq!(canonical(rotated), forward);

    assert_eq!(
        forward,
        vec![
            (1, vec!["cluster-scoped".to_string(), "namespaces".to_string()]),
            (DEFAULT_APPLY_WAVE, vec!["operators".to_string(), "platform".to_string()]),
            (200, vec!["Zeta".to_string(), "apps".to_string()]),
        ]
    );
}

#[test]
fn every_item_lands_in_exactly_one_wave() {
    let waves = group_into_waves(batch()).unwrap();
    let total: usize = waves.iter().map(|w| w.items.len()).sum();
    assert_eq!(total, batch().len());
    assert!(waves.iter().all(|w| !w.items.is_empty()));
    assert!(waves.windows(2).all(|p| p[0].tag < p[1].tag));
}
