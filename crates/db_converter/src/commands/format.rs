use clap::Args;
use xray_db::DbVersion;

/// Archive format flags, at most one may be given
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(multiple = false)]
pub struct FormatArgs {
    /// Build 11xx archive (.xrp)
    #[arg(long = "11xx")]
    v1114: bool,

    /// Build 2215 archive (.xp, .xp?)
    #[arg(long = "2215")]
    v2215: bool,

    /// Build 2945 archive
    #[arg(long = "2945")]
    v2945: bool,

    /// Build 2947 / Russian retail archive, encrypted table
    #[arg(long = "2947ru")]
    v2947ru: bool,

    /// Worldwide retail archive, encrypted table
    #[arg(long = "2947ww")]
    v2947ww: bool,

    /// Clear Sky / Call of Pripyat archive (.db, .db?, .xdb, .xdb?)
    #[arg(long = "xdb")]
    xdb: bool,

    /// Archive format by name: 11xx, 2215, 2945, 2947ru, 2947ww or xdb
    #[arg(long, value_name = "NAME")]
    format: Option<DbVersion>,
}

impl FormatArgs {
    /// The selected format, if any flag was given
    pub fn version(&self) -> Option<DbVersion> {
        if self.format.is_some() {
            return self.format;
        }
        [
            (self.v1114, DbVersion::V1114),
            (self.v2215, DbVersion::V2215),
            (self.v2945, DbVersion::V2945),
            (self.v2947ru, DbVersion::V2947Ru),
            (self.v2947ww, DbVersion::V2947Ww),
            (self.xdb, DbVersion::Xdb),
        ]
        .into_iter()
        .find_map(|(set, version)| set.then_some(version))
    }
}
