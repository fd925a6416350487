pub mod app_settings;
pub mod issue;
pub mod issue_activity;
pub mod issue_attachment;
pub mod issue_comment;
pub mod issue_type;
pub mod push_subscription;
pub mod refresh_token;
pub mod staff_region;
pub mod user;

pub use app_settings::{Entity as AppSettings, Model as AppSettingsModel};
pub use issue::{Entity as Issue, IssueStatus};
pub use issue_activity::{ActivityKind, Entity as IssueActivity, Model as IssueActivityModel};
pub use issue_attachment::Entity as IssueAttachment;
pub use issue_comment::{Entity as IssueComment, Model as IssueCommentModel};
pub use issue_type::{Entity as IssueType, Model as IssueTypeModel};
pub use push_subscription::{Entity as PushSubscription, Model as PushSubscriptionModel};
pub use refresh_token::Entity as RefreshToken;
pub use staff_region::{Entity as StaffRegion, Model as StaffRegionModel};
pub use user::{Entity as User, Model as UserModel, UserRole};
