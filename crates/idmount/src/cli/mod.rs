//! CLI definitions and handler.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use color_eyre::eyre::Result;

use idmount_common::IdmountResult;

use crate::idmap::{IdMapSet, MapArg, parse_mount_mapping};
use crate::runtime::caller::{DEFAULT_HELPER, DEFAULT_SHELL};
use crate::runtime::{CallerHandoff, IdmappedMount};

const EXAMPLES: &str = "\
Idmap format:
  <kind>:<ns_id>:<host_id>:<range> where <kind> is one of
    b, both   map both uids and gids
    u, uid    map uids
    g, gid    map gids
  both:1000:1001:1       map uid and gid 1000 to 1001 and no other ids
  uid:20000:100000:1000  map uid 20000 to 100000, 20001 to 100001, ...
  Up to 340 mappings of each kind may be given.

Examples:
  Map both uids and gids:
    idmount --map-mount b:0:10000:10000 /source /target
  Map uids and gids separately:
    idmount --map-mount 'u:0:10000:10000 g:0:20000:20000' /source /target
  Reuse the mapping of an existing user namespace:
    idmount --map-mount /proc/1234/ns/user /source /target
  Also move the caller into a mapped user namespace:
    idmount --map-caller b:0:10000:10000 --map-mount b:0:10000:1000 /source /target";

/// Create an idmapped mount of <SOURCE> at <TARGET>
#[derive(Parser, Debug)]
#[command(name = "idmount")]
#[command(author, version, about, long_about = None)]
#[command(after_help = EXAMPLES)]
pub struct Cli {
    /// Idmap for the mount, or a /proc/<pid>/ns/user path whose mapping is reused
    #[arg(long = "map-mount", value_name = "IDMAP")]
    pub map_mount: Vec<MapArg>,

    /// Idmap for a new user namespace the caller is moved into afterwards
    #[arg(long = "map-caller", value_name = "IDMAP")]
    pub map_caller: Vec<IdMapSet>,

    /// Clone the whole mount tree below <SOURCE> and idmap every mount in it
    #[arg(short, long)]
    pub recursive: bool,

    /// Helper used for --map-caller
    #[arg(long, env = "IDMOUNT_CALLER_HELPER", default_value = DEFAULT_HELPER)]
    pub caller_helper: String,

    /// Program started inside the caller's new user namespace
    #[arg(long, env = "IDMOUNT_CALLER_SHELL", default_value = DEFAULT_SHELL)]
    pub caller_shell: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Path whose mount is cloned
    pub source: PathBuf,

    /// Mountpoint the clone is attached to
    pub target: PathBuf,
}

impl Cli {
    /// Turn the parsed arguments into a mount request.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the mount mappings conflict, or
    /// [`idmount_common::IdmountError::IdMapTooLarge`] for the caller maps.
    pub fn to_mount(&self) -> IdmountResult<IdmappedMount> {
        let mapping = parse_mount_mapping(self.map_mount.iter().cloned())?;

        let mut mount = IdmappedMount::new(&self.source, &self.target)
            .mapping(mapping)
            .recursive(self.recursive);

        if !self.map_caller.is_empty() {
            let maps: IdMapSet = self
                .map_caller
                .iter()
                .flat_map(|set| set.entries().iter().copied())
                .collect();
            let caller = CallerHandoff::new(maps)?
                .program(&self.caller_helper)
                .shell(&self.caller_shell);
            mount = mount.caller(caller);
        }

        Ok(mount)
    }

    /// Execute the command.
    ///
    /// # Errors
    ///
    /// Returns the report of any namespace or mount failure. Usage errors
    /// exit the process through clap instead.
    pub fn execute(self) -> Result<()> {
        let mount = match self.to_mount() {
            Ok(mount) => mount,
            Err(err) if err.is_usage() => {
                Self::command()
                    .error(ErrorKind::ArgumentConflict, err.to_string())
                    .exit();
            }
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(
            source = %mount.source_path().display(),
            target = %mount.target_path().display(),
            mapping = ?mount.mount_mapping(),
            "Creating idmapped mount"
        );

        mount.run()?;
        Ok(())
    }
}
