//! `desc_files` job driver: a full tar per matched path.

use crate::globwalk::{self, ExcludeSet};
use crate::jobs::{JobContext, Rotator};
use crate::{archive, paths};

pub fn run(ctx: &JobContext) {
    let job = ctx.name();
    let tmp_dir = match ctx.make_tmp_dir() {
        Ok(dir) => dir,
        Err(e) => {
            ctx.log.error(job, &format!("{e}"));
            return;
        }
    };
    let mut rotator = Rotator::new(ctx);

    for source in &ctx.spec.sources {
        if source.target.is_empty() {
            ctx.log.error(job, "Missing required key:'target'!");
            continue;
        }
        let excludes = ExcludeSet::expand(&source.target, &source.excludes);

        for pattern in &source.target {
            let matched = globwalk::expand_glob(pattern);
            if matched.is_empty() {
                ctx.log.error(
                    job,
                    &format!(
                        "No file system objects found that match the regular expression '{pattern}'!"
                    ),
                );
                continue;
            }

            for target in matched.iter().filter(|t| !excludes.is_excluded(t.as_path())) {
                let backup_name = globwalk::backup_name_from_glob(pattern, target);
                let part = globwalk::part_of_dir_path(&backup_name);
                let artifact =
                    paths::artifact_path(&tmp_dir, &backup_name, "tar", source.gzip, ctx.cal);

                match archive::create_tar(&artifact, target, source.gzip, &excludes) {
                    Ok(()) => {
                        ctx.log.info(
                            job,
                            &format!(
                                "Successfully created '{}' file in tmp directory.",
                                artifact.display()
                            ),
                        );
                        rotator.produced(artifact, part);
                    }
                    Err(e) => {
                        ctx.log.error(
                            job,
                            &format!(
                                "Can't create archive '{}' in tmp directory:{e}",
                                artifact.display()
                            ),
                        );
                    }
                }
            }
            rotator.end_target();
        }
        rotator.end_source();
    }

    rotator.end_job();
    ctx.cleanup(&tmp_dir);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
