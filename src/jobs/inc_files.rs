//! `inc_files` job driver: hands each matched path to the incremental
//! chain engine, once per enabled destination.

use crate::globwalk::{self, ExcludeSet};
use crate::increment;
use crate::jobs::JobContext;
use crate::rotate;
use crate::{mount, storage};

pub fn run(ctx: &JobContext) {
    let job = ctx.name();

    for source in &ctx.spec.sources {
        if source.target.is_empty() {
            ctx.log.error(job, "Missing required key:'target'!");
            continue;
        }
        let excludes = ExcludeSet::expand(&source.target, &source.excludes);

        for pattern in &source.target {
            for target in globwalk::expand_glob(pattern)
                .iter()
                .filter(|t| !excludes.is_excluded(t.as_path()))
            {
                let backup_name = globwalk::backup_name_from_glob(pattern, target);
                let part = globwalk::part_of_dir_path(&backup_name);

                for spec in rotate::local_last(&ctx.spec.storages) {
                    if !storage::is_save_to_storage(spec) {
                        continue;
                    }
                    let mut data = match storage::validate(job, spec) {
                        Ok(d) => d,
                        Err(e) => {
                            ctx.log.error(job, &format!("{e}"));
                            continue;
                        }
                    };
                    if let Err(e) = mount::mount(&mut data) {
                        ctx.log.error(
                            job,
                            &format!("Can't mount remote '{}' storage: {e}", data.kind),
                        );
                        continue;
                    }

                    increment::place_incremental(
                        ctx.log,
                        ctx.cal,
                        &data,
                        &part,
                        &backup_name,
                        target,
                        &excludes,
                        source.gzip,
                        job,
                        ctx.spec.inc_months_to_store,
                    );

                    if let Err(e) = mount::unmount(&data) {
                        ctx.log.error(
                            job,
                            &format!("Can't umount remote '{}' storage: {e}", data.kind),
                        );
                    }
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
