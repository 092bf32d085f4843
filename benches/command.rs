use criterion::{black_box, criterion_group, criterion_main, Criterion};
use smina_driver::command::{build_dock_command, DockPaths};
use smina_driver::job::DockPlan;
use smina_driver::naming::ArtifactNamer;
use smina_driver::paths::{PathStyle, PathTranslator};
use std::path::{Path, PathBuf};

fn plan() -> DockPlan {
    DockPlan {
        receptor: "1abc".into(),
        ligand: PathBuf::from(r"C:\ligands\lig1"),
        ligand_name: "lig1".into(),
        flexres: Some("A:12,A:40,B:113".into()),
        scoring_table: Some(PathBuf::from(r"C:\tables\dkoes.scr")),
        exhaustiveness: 16,
        num_modes: 9,
        seed: Some(42),
        suffix: Some("run2".into()),
        write_log: true,
    }
}

fn bench_dock_command(c: &mut Criterion) {
    let plan = plan();
    let namer = ArtifactNamer::new(r"C:\work");
    let paths = DockPaths::for_plan(&plan, Path::new(r"C:\smina\smina.static"), &namer);
    let translator = PathTranslator::new(PathStyle::Wsl);

    c.bench_function("build_dock_command_wsl", |b| {
        b.iter(|| black_box(build_dock_command(black_box(&plan), &paths, &translator)))
    });

    let command = build_dock_command(&plan, &paths, &translator).unwrap();
    c.bench_function("display_dock_command", |b| {
        b.iter(|| black_box(command.to_string()))
    });
}

criterion_group!(command_benches, bench_dock_command);
criterion_main!(command_benches);
