use std::collections::HashMap;

use pretty_assertions::assert_eq;

use super::{is_enabled, Options};

fn from_vars(vars: &[(&str, &str)]) -> Options {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Options::default().with_env(|key| vars.get(key).cloned())
}

#[test]
fn defaults_run_every_pass() {
    let options = Options::default();
    assert_eq!(options.jobs, None);
    assert!(options.horizontal_class_merging);
    assert!(options.enum_unboxing);
    assert!(options.argument_propagation);
    assert_eq!(options.max_group_size, 30);
    assert_eq!(options.max_in_flow_size, 16);
    assert!(!options.verify_lenses);
}

#[test]
fn no_variables_keep_the_defaults() {
    assert_eq!(from_vars(&[]), Options::default());
}

#[test]
fn variables_disable_passes() {
    let options = from_vars(&[
        ("PARE_JOBS", "3"),
        ("PARE_DISABLE_ENUM_UNBOXING", "1"),
        ("PARE_DISABLE_ARGUMENT_PROPAGATION", "false"),
    ]);
    assert_eq!(options.jobs, Some(3));
    assert!(!options.enum_unboxing);
    assert!(options.argument_propagation);
    assert!(options.horizontal_class_merging);
}

#[test]
fn invalid_job_counts_are_ignored() {
    assert_eq!(from_vars(&[("PARE_JOBS", "many")]).jobs, None);
    assert_eq!(from_vars(&[("PARE_JOBS", "0")]).jobs, None);
}

#[test]
fn flag_values() {
    assert!(is_enabled("1"));
    assert!(is_enabled(" yes "));
    assert!(!is_enabled(""));
    assert!(!is_enabled("0"));
    assert!(!is_enabled("FALSE"));
}

#[test]
fn pass_options_follow_the_pipeline_options() {
    let options = Options::default()
        .with_max_group_size(4)
        .with_enum_unboxing_early_exit(true)
        .with_max_in_flow_size(2);
    assert_eq!(options.merger_options().max_group_size, 4);
    assert!(options.unboxer_options().early_exit);
    assert_eq!(options.unboxer_options().max_instance_fields, 7);
    assert_eq!(options.propagator_options().max_in_flow_size, 2);
}
