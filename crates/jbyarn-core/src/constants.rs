//! Fixed names shared by the master, the launch command, and the
//! configuration pass that runs inside each container.

/// Directory name of the server distribution inside its archive.
pub const SERVER_VERSION: &str = "jboss-as-7.1.1.Final";

/// Default location of the server distribution archive.
pub const DEFAULT_DIST_ARTIFACT: &str =
    "hdfs://yarn1.apps.hdp:9000/apps/jboss/dist/jboss-as-7.1.1.Final.tar.gz";

/// Link name the distribution archive is localized under.
pub const DIST_LINK: &str = "jboss";

/// Link name the jbyarn binary is localized under.
pub const APP_LINK: &str = "jbyarn";

/// Security realm holding management users.
pub const MANAGEMENT_REALM: &str = "ManagementRealm";

/// Native management port of the domain controller.
pub const REMOTE_MANAGEMENT_PORT: u16 = 9999;

/// Port shift between consecutive instances.
pub const PORT_OFFSET_STEP: u32 = 150;

pub const MASTER_USER: &str = "master";
pub const MASTER_PASSWORD: &str = "master";
pub const SLAVE_USER: &str = "slave";
pub const SLAVE_PASSWORD: &str = "slave";

/// Separator between launch commands. Does not stop on a non-zero exit.
pub const COMMAND_SEPARATOR: &str = ";";

/// Exit status the resource manager reports for infrastructure aborts.
pub const ABORTED_EXIT_STATUS: i32 = -100;

/// Exit status reported for a container whose launch never started.
pub const LAUNCH_FAILED_EXIT_STATUS: i32 = -1;

/// Virtual cores asked for each container.
pub const DEFAULT_CONTAINER_VCORES: u32 = 2;
